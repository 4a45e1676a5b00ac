use async_trait::async_trait;

use super::{CheckpointBackend, CheckpointError};
use crate::domain_types::ReplayCheckpoint;

/// 集中式資料表後端
///
/// 尚未接上實際的資料表服務，所有操作都返回 [`CheckpointError::NotImplemented`]。
#[derive(Debug, Default)]
pub struct TableCheckpointStore;

impl TableCheckpointStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CheckpointBackend for TableCheckpointStore {
    fn name(&self) -> &'static str {
        "table"
    }

    async fn save(&self, _checkpoint: &ReplayCheckpoint) -> Result<(), CheckpointError> {
        Err(CheckpointError::NotImplemented("table save".to_string()))
    }

    async fn load(&self) -> Result<Option<ReplayCheckpoint>, CheckpointError> {
        Err(CheckpointError::NotImplemented("table load".to_string()))
    }

    async fn delete(&self) -> Result<(), CheckpointError> {
        Err(CheckpointError::NotImplemented("table delete".to_string()))
    }
}
