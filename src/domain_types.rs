pub mod checkpoint;
pub mod event;
pub mod pacing;

pub use checkpoint::ReplayCheckpoint;
pub use event::{EventRecord, EventType};
pub use pacing::{PacingPolicy, SpeedMode};
