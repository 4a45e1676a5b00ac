//! Chipmunk 事件來源
//!
//! 事件來源從底層儲存產生有序、惰性的事件串流。本地檔案與物件儲存
//! 兩種實作滿足同一個契約，逐行解析與分類邏輯集中在 [`parser`]。

pub mod local;
pub mod object_storage;
pub mod parser;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{SourceConfig, SourceType};
use crate::domain_types::EventRecord;

pub use local::LocalFileSource;
pub use object_storage::ObjectStorageSource;
pub use parser::{classify, parse_line, EventParser, LineOutcome};

/// 事件來源錯誤
#[derive(Debug, Error)]
pub enum SourceError {
    /// 來源檔案或物件不存在或無法開啟
    #[error("Event source unavailable: {0}")]
    Unavailable(String),

    /// 讀取中途失敗
    #[error("Failed to read event source: {0}")]
    Read(#[from] std::io::Error),

    /// 物件儲存 SDK 錯誤
    #[error("Object storage error: {0}")]
    ObjectStorage(String),
}

/// 有序事件串流
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventRecord, SourceError>> + Send>>;

/// 事件來源特徵
#[async_trait]
pub trait EventSource: Send + Sync {
    /// 來源識別碼，同一來源在多次執行間保持穩定
    fn source_id(&self) -> String;

    /// 開啟來源並返回有序的惰性事件串流
    async fn open(&self) -> Result<EventStream, SourceError>;

    /// 來源中的事件總數，無法低成本預先計數時返回 None
    async fn count(&self) -> Result<Option<u64>, SourceError>;

    /// 釋放底層資源，可重複調用
    async fn close(&self) -> Result<(), SourceError>;
}

/// 依配置建立事件來源
pub fn from_config(config: &SourceConfig) -> Arc<dyn EventSource> {
    match config.source_type {
        SourceType::LocalFile => Arc::new(LocalFileSource::new(&config.local.file_path)),
        SourceType::ObjectStorage => Arc::new(ObjectStorageSource::from_config(&config.object_storage)),
    }
}
