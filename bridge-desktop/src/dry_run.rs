//! Dry-run remote library

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::remote::{RemoteId, RemoteLibrary, SongMetadata};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use uuid::Uuid;

/// `RemoteLibrary` that performs no remote work.
///
/// Every call is logged at `info` and succeeds. Creations return fresh
/// UUIDs so the id mapping store fills up exactly as it would against a
/// real service.
#[derive(Debug, Default)]
pub struct DryRunRemoteLibrary {
    calls: AtomicU64,
}

impl DryRunRemoteLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of remote calls received so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl RemoteLibrary for DryRunRemoteLibrary {
    async fn upload_song(&self, path: &Path) -> Result<RemoteId> {
        self.record();
        let remote_id = Uuid::new_v4().to_string();
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(file = %file, remote_id = %remote_id, "dry-run: upload_song");
        Ok(remote_id)
    }

    async fn update_song_metadata(&self, remote_id: &str, metadata: &SongMetadata) -> Result<()> {
        self.record();
        let fields: Vec<&str> = metadata.iter().map(|(key, _)| key.as_str()).collect();
        info!(remote_id, ?fields, "dry-run: update_song_metadata");
        Ok(())
    }

    async fn delete_song(&self, remote_id: &str) -> Result<()> {
        self.record();
        info!(remote_id, "dry-run: delete_song");
        Ok(())
    }

    async fn create_playlist(&self, name: &str) -> Result<RemoteId> {
        self.record();
        let remote_id = Uuid::new_v4().to_string();
        info!(name, remote_id = %remote_id, "dry-run: create_playlist");
        Ok(remote_id)
    }

    async fn rename_playlist(&self, remote_id: &str, name: &str) -> Result<()> {
        self.record();
        info!(remote_id, name, "dry-run: rename_playlist");
        Ok(())
    }

    async fn delete_playlist(&self, remote_id: &str) -> Result<()> {
        self.record();
        info!(remote_id, "dry-run: delete_playlist");
        Ok(())
    }

    async fn replace_playlist_entries(&self, remote_id: &str, song_ids: &[RemoteId]) -> Result<()> {
        self.record();
        info!(remote_id, entries = song_ids.len(), "dry-run: replace_playlist_entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_creates_distinct_ids() {
        let remote = DryRunRemoteLibrary::new();

        let a = remote.upload_song(Path::new("/music/a.mp3")).await.unwrap();
        let b = remote.create_playlist("Mix").await.unwrap();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());

        remote.replace_playlist_entries(&b, &[a.clone()]).await.unwrap();
        remote.delete_song(&a).await.unwrap();
        assert_eq!(remote.call_count(), 4);
    }
}
