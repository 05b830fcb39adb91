//! # Checkpoint Store
//!
//! A single durable integer: the change id of the last fully processed
//! change log entry. Kept outside the media player's database.
//!
//! [`FileCheckpointStore`] stores it as decimal text and replaces it
//! atomically:
//!
//! 1. write `<file>.tmp` and fsync it
//! 2. move the current `<file>` to `<file>.bak`
//! 3. rename `<file>.tmp` over `<file>` and fsync the directory
//!
//! An interrupted write leaves either the previous value in `<file>` or in
//! `<file>.bak`, never a torn one.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last durably stored change id; 0 if nothing was ever stored.
    async fn load(&self) -> Result<i64>;

    /// Durably replace the stored change id.
    async fn store(&self, change_id: i64) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, "bak")
    }

    fn temp_path(&self) -> PathBuf {
        with_suffix(&self.path, "tmp")
    }

    /// Write 0 unless a checkpoint (or its backup) already exists.
    pub async fn initialize(&self) -> Result<()> {
        if exists(&self.path).await || exists(&self.backup_path()).await {
            debug!(path = ?self.path, "Checkpoint already present");
            return Ok(());
        }
        self.store(0).await
    }

    async fn read(path: &Path) -> Option<i64> {
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(?path, error = %e, "Could not read checkpoint file");
                return None;
            }
        };
        match text.trim().parse::<i64>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(?path, "Checkpoint file is not a valid change id");
                None
            }
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<i64> {
        if let Some(value) = Self::read(&self.path).await {
            return Ok(value);
        }

        let backup = self.backup_path();
        if let Some(value) = Self::read(&backup).await {
            warn!(path = ?self.path, value, "Checkpoint restored from backup");
            return Ok(value);
        }

        if exists(&self.path).await || exists(&backup).await {
            return Err(SyncError::Checkpoint(format!(
                "neither {} nor its backup holds a readable change id",
                self.path.display()
            )));
        }
        Ok(0)
    }

    async fn store(&self, change_id: i64) -> Result<()> {
        let tmp = self.temp_path();
        let io = |step: &str, e: std::io::Error| {
            SyncError::Checkpoint(format!("{step} {}: {e}", self.path.display()))
        };

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| io("create temp for", e))?;
        file.write_all(change_id.to_string().as_bytes())
            .await
            .map_err(|e| io("write", e))?;
        file.sync_all().await.map_err(|e| io("sync", e))?;
        drop(file);

        if exists(&self.path).await {
            fs::rename(&self.path, self.backup_path())
                .await
                .map_err(|e| io("back up", e))?;
        }
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io("replace", e))?;

        sync_parent(&self.path).await;
        debug!(change_id, "Checkpoint stored");
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Best effort: not every platform can fsync a directory.
async fn sync_parent(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    match fs::File::open(parent).await {
        Ok(dir) => {
            if let Err(e) = dir.sync_all().await {
                debug!(error = %e, "Directory sync not supported");
            }
        }
        Err(e) => debug!(error = %e, "Could not open checkpoint directory for sync"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_checkpoint_is_zero() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("last_change"));
        assert_eq!(store.load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_and_load_keeps_backup() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("last_change"));

        store.store(3).await.unwrap();
        store.store(7).await.unwrap();

        assert_eq!(store.load().await.unwrap(), 7);
        assert_eq!(std::fs::read_to_string(store.backup_path()).unwrap(), "3");
        assert!(!dir.path().join("last_change.tmp").exists());
    }

    #[tokio::test]
    async fn test_falls_back_to_backup() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("last_change"));
        store.store(4).await.unwrap();
        store.store(5).await.unwrap();

        std::fs::write(store.path(), "garbage").unwrap();
        assert_eq!(store.load().await.unwrap(), 4);

        std::fs::remove_file(store.path()).unwrap();
        assert_eq!(store.load().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_unreadable_without_backup_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("last_change"));
        std::fs::write(store.path(), "not a number").unwrap();

        assert!(matches!(store.load().await, Err(SyncError::Checkpoint(_))));
    }

    #[tokio::test]
    async fn test_unreadable_backup_without_primary_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("last_change"));
        std::fs::write(store.backup_path(), "torn").unwrap();

        assert!(matches!(store.load().await, Err(SyncError::Checkpoint(_))));
    }

    #[tokio::test]
    async fn test_initialize_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("last_change"));

        store.initialize().await.unwrap();
        assert_eq!(store.load().await.unwrap(), 0);

        store.store(12).await.unwrap();
        store.initialize().await.unwrap();
        assert_eq!(store.load().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_store_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("absent").join("last_change"));
        assert!(matches!(store.store(1).await, Err(SyncError::Checkpoint(_))));
    }
}
