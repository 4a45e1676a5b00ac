// 模組定義
pub mod checkpoint;
pub mod config;
pub mod domain_types;
pub mod messaging;
pub mod monitor;
pub mod replay;
pub mod source;
pub mod utils;
