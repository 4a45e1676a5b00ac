use deadpool_lapin::{BuildError, PoolError};
use lapin::Error as LapinError;
use thiserror::Error;

/// 發布錯誤
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Lapin error: {0}")]
    Lapin(#[from] LapinError),

    #[error("Broker rejected message on topic {topic} with key {key}")]
    Rejected { topic: String, key: String },

    #[error("Channel closed")]
    ChannelClosed,
}

impl From<PoolError> for PublishError {
    fn from(error: PoolError) -> Self {
        PublishError::Pool(error.to_string())
    }
}

impl From<BuildError> for PublishError {
    fn from(error: BuildError) -> Self {
        PublishError::Pool(error.to_string())
    }
}
