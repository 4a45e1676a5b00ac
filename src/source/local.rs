use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::{debug, info};

use super::parser::{count_record_lines, event_stream};
use super::{EventSource, EventStream, SourceError};

/// 本地 Chipmunk 檔案來源
#[derive(Debug)]
pub struct LocalFileSource {
    path: PathBuf,
    closed: AtomicBool,
}

impl LocalFileSource {
    /// 創建新的本地檔案來源，檔案在開啟時才檢查
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open_reader(&self) -> Result<BufReader<File>, SourceError> {
        let file = File::open(&self.path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => {
                SourceError::Unavailable(format!("File not found: {}", self.path.display()))
            }
            _ => SourceError::Unavailable(format!("Cannot open {}: {}", self.path.display(), err)),
        })?;
        Ok(BufReader::new(file))
    }
}

#[async_trait]
impl EventSource for LocalFileSource {
    fn source_id(&self) -> String {
        self.path.display().to_string()
    }

    async fn open(&self) -> Result<EventStream, SourceError> {
        let reader = self.open_reader().await?;
        self.closed.store(false, Ordering::SeqCst);
        info!("Opened local Chipmunk file: {}", self.path.display());
        Ok(event_stream(reader, self.source_id()))
    }

    async fn count(&self) -> Result<Option<u64>, SourceError> {
        let reader = self.open_reader().await?;
        let count = count_record_lines(reader).await?;
        debug!("Counted {} records in {}", count, self.path.display());
        Ok(Some(count))
    }

    async fn close(&self) -> Result<(), SourceError> {
        // 串流持有各自的檔案控制代碼，這裡只記錄狀態
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closed local source: {}", self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use futures::TryStreamExt;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let source = LocalFileSource::new("/nonexistent/path/events.chipmunk");
        assert_matches!(source.open().await.err(), Some(SourceError::Unavailable(_)));
        assert_matches!(source.count().await, Err(SourceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_file_yields_no_events() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let source = LocalFileSource::new(file.path());

        let events: Vec<_> = source.open().await.unwrap().try_collect().await.unwrap();
        assert!(events.is_empty());
        assert_eq!(source.count().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_open_count_and_close() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# header comment").unwrap();
        writeln!(file, r#"{{"trade_id": "T1", "region": "US"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"symbol": "AAPL", "price": 150.0}}"#).unwrap();
        file.flush().unwrap();

        let source = LocalFileSource::new(file.path());
        assert_eq!(source.source_id(), file.path().display().to_string());
        assert_eq!(source.count().await.unwrap(), Some(2));

        let events: Vec<_> = source.open().await.unwrap().try_collect().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].region(), "US");

        source.close().await.unwrap();
        source.close().await.unwrap();
    }
}
