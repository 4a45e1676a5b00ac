//! 重播檢查點管理
//!
//! 檢查點是單一記錄：每個部署同時只有一份，覆寫式儲存。
//! [`CheckpointManager`] 包裝實際的儲存後端，並保存最近一次寫入或載入的快照供狀態查詢。

pub mod file;
pub mod table;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{CheckpointConfig, CheckpointStorage};
use crate::domain_types::ReplayCheckpoint;

pub use file::FileCheckpointStore;
pub use table::TableCheckpointStore;

/// 檢查點錯誤
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checkpoint backend not implemented: {0}")]
    NotImplemented(String),
}

/// 檢查點儲存後端
#[async_trait]
pub trait CheckpointBackend: Send + Sync {
    /// 後端名稱（用於日誌）
    fn name(&self) -> &'static str;

    /// 覆寫保存快照
    async fn save(&self, checkpoint: &ReplayCheckpoint) -> Result<(), CheckpointError>;

    /// 讀取快照，不存在時返回 None
    async fn load(&self) -> Result<Option<ReplayCheckpoint>, CheckpointError>;

    /// 刪除快照，不存在時視為成功
    async fn delete(&self) -> Result<(), CheckpointError>;
}

/// 檢查點管理器
pub struct CheckpointManager {
    backend: Arc<dyn CheckpointBackend>,
    enabled: bool,
    interval: Duration,
    current: RwLock<Option<ReplayCheckpoint>>,
}

impl CheckpointManager {
    pub fn new(backend: Arc<dyn CheckpointBackend>, enabled: bool, interval: Duration) -> Self {
        Self {
            backend,
            enabled,
            interval,
            current: RwLock::new(None),
        }
    }

    /// 依配置建立管理器
    pub fn from_config(config: &CheckpointConfig) -> Self {
        let backend: Arc<dyn CheckpointBackend> = match config.storage {
            CheckpointStorage::File => Arc::new(FileCheckpointStore::new(&config.file_path)),
            CheckpointStorage::Table => Arc::new(TableCheckpointStore::new()),
        };
        info!(
            "Checkpointing {} (backend: {}, interval: {}s)",
            if config.enabled { "enabled" } else { "disabled" },
            backend.name(),
            config.interval_secs
        );
        Self::new(backend, config.enabled, config.interval())
    }

    /// 停用檢查點的管理器
    pub fn disabled() -> Self {
        Self::new(Arc::new(TableCheckpointStore::new()), false, Duration::from_secs(30))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 最近一次保存或載入的快照
    pub fn current(&self) -> Option<ReplayCheckpoint> {
        self.current.read().clone()
    }

    /// 保存快照，停用時不做任何事
    pub async fn save(&self, checkpoint: ReplayCheckpoint) -> Result<(), CheckpointError> {
        if !self.enabled {
            return Ok(());
        }

        self.backend.save(&checkpoint).await?;
        debug!(
            "Saved checkpoint for {}: resume at {}, published {}, failed {}",
            checkpoint.source_id,
            checkpoint.resume_sequence_number,
            checkpoint.events_published,
            checkpoint.events_failed
        );
        *self.current.write() = Some(checkpoint);
        Ok(())
    }

    /// 載入屬於指定來源的快照
    ///
    /// 停用、不存在、來源不符或讀取失敗時都返回 None，重播從頭開始。
    pub async fn load(&self, source_id: &str) -> Option<ReplayCheckpoint> {
        if !self.enabled {
            return None;
        }

        match self.backend.load().await {
            Ok(Some(checkpoint)) if checkpoint.belongs_to(source_id) => {
                info!(
                    "Loaded checkpoint for {}: resume at sequence {}",
                    source_id, checkpoint.resume_sequence_number
                );
                *self.current.write() = Some(checkpoint.clone());
                Some(checkpoint)
            }
            Ok(Some(checkpoint)) => {
                warn!(
                    "Ignoring checkpoint for different source: expected {}, found {}",
                    source_id, checkpoint.source_id
                );
                None
            }
            Ok(None) => {
                debug!("No checkpoint found for {}", source_id);
                None
            }
            Err(CheckpointError::NotImplemented(reason)) => {
                warn!("Checkpoint backend {} unavailable: {}", self.backend.name(), reason);
                None
            }
            Err(err) => {
                error!("Failed to load checkpoint: {}", err);
                None
            }
        }
    }

    /// 刪除快照，失敗只記錄日誌
    ///
    /// 每個部署只有一份快照，因此不比對來源直接刪除。
    pub async fn delete(&self, source_id: &str) {
        *self.current.write() = None;
        if !self.enabled {
            return;
        }

        match self.backend.delete().await {
            Ok(()) => info!("Checkpoint deleted for {}", source_id),
            Err(err) => warn!("Failed to delete checkpoint for {}: {}", source_id, err),
        }
    }
}
