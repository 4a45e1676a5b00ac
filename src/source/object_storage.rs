use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    Client,
};
use once_cell::sync::OnceCell;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncBufRead;
use tracing::{debug, info};

use super::parser::event_stream;
use super::{EventSource, EventStream, SourceError};
use crate::config::ObjectStorageConfig;

/// S3 相容物件儲存上的 Chipmunk 檔案來源
///
/// 物件以串流方式讀取，不會整份載入記憶體。客戶端在首次開啟時才建立。
pub struct ObjectStorageSource {
    config: ObjectStorageConfig,
    client: OnceCell<Client>,
    closed: AtomicBool,
}

impl ObjectStorageSource {
    pub fn from_config(config: &ObjectStorageConfig) -> Self {
        Self {
            config: config.clone(),
            client: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn object_key(&self) -> &str {
        &self.config.object_key
    }

    fn client(&self) -> &Client {
        self.client.get_or_init(|| make_s3_client(&self.config))
    }
}

/// 建立 S3 客戶端；設定自訂端點時使用路徑樣式（MinIO）
fn make_s3_client(config: &ObjectStorageConfig) -> Client {
    let credentials = Credentials::new(
        config.access_key_id.clone(),
        config.secret_access_key.clone(),
        None,
        None,
        "replay-engine",
    );
    let mut builder = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials);
    if !config.endpoint.is_empty() {
        builder = builder
            .endpoint_url(config.endpoint.clone())
            .force_path_style(true);
    }
    Client::from_conf(builder.build())
}

#[async_trait]
impl EventSource for ObjectStorageSource {
    fn source_id(&self) -> String {
        format!("{}/{}", self.config.bucket, self.config.object_key)
    }

    async fn open(&self) -> Result<EventStream, SourceError> {
        let resp = self
            .client()
            .get_object()
            .bucket(self.config.bucket.clone())
            .key(self.config.object_key.clone())
            .send()
            .await
            .map_err(|err| {
                let missing = err
                    .as_service_error()
                    .map(|service_err| service_err.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    SourceError::Unavailable(format!("Object not found: {}", self.source_id()))
                } else {
                    SourceError::ObjectStorage(err.to_string())
                }
            })?;

        self.closed.store(false, Ordering::SeqCst);
        info!(
            "Opened object s3://{} ({} bytes)",
            self.source_id(),
            resp.content_length().unwrap_or_default()
        );

        let reader: Pin<Box<dyn AsyncBufRead + Send>> = Box::pin(resp.body.into_async_read());
        Ok(event_stream(reader, self.source_id()))
    }

    async fn count(&self) -> Result<Option<u64>, SourceError> {
        // 計數需要完整下載一次物件
        Ok(None)
    }

    async fn close(&self) -> Result<(), SourceError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closed object storage source: {}", self.source_id());
        }
        Ok(())
    }
}
