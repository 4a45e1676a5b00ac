use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::{CheckpointBackend, CheckpointError};
use crate::domain_types::ReplayCheckpoint;

/// 單一 JSON 檔案後端
///
/// 先寫入同目錄下的暫存檔再重新命名，讀取方不會看到寫到一半的檔案。
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CheckpointBackend for FileCheckpointStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn save(&self, checkpoint: &ReplayCheckpoint) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(checkpoint)?;
        let temp_path = self.temp_path();
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<ReplayCheckpoint>, CheckpointError> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Ok(Some(serde_json::from_slice(&content)?))
    }

    async fn delete(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("Checkpoint file already absent: {}", self.path.display());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::SpeedMode;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("nested/checkpoint.json"));

        assert!(store.load().await.unwrap().is_none());

        let checkpoint = ReplayCheckpoint::new("data/a.chipmunk", 42, SpeedMode::Accelerated)
            .with_counts(40, 2)
            .with_total_events(Some(100));
        store.save(&checkpoint).await.unwrap();
        assert!(!store.temp_path().exists());

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, checkpoint);

        store.delete().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        // 重複刪除不報錯
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));

        store
            .save(&ReplayCheckpoint::new("data/a.chipmunk", 10, SpeedMode::Burst))
            .await
            .unwrap();
        store
            .save(&ReplayCheckpoint::new("data/b.chipmunk", 3, SpeedMode::Burst))
            .await
            .unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.source_id, "data/b.chipmunk");
        assert_eq!(loaded.resume_sequence_number, 3);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, "{ not a checkpoint").unwrap();

        let store = FileCheckpointStore::new(&path);
        assert_matches!(store.load().await, Err(CheckpointError::Serialization(_)));
    }
}
