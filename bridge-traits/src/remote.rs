//! Remote Library Abstraction
//!
//! The pre-authenticated handle through which change handlers push local
//! edits to a remote music service. Authentication, rate limiting and
//! transport retries belong to the implementation; the core only sees
//! success or a [`BridgeError`](crate::error::BridgeError).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

/// Identifier assigned by the remote service.
pub type RemoteId = String;

/// Metadata fields sent to the remote service for a song, keyed by the
/// remote field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongMetadata {
    fields: BTreeMap<String, Value>,
}

impl SongMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

/// Remote music library trait
///
/// Every operation either succeeds or fails with a `BridgeError`; the sync
/// engine treats any failure as a remote call failure and does not retry it.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::remote::RemoteLibrary;
///
/// async fn push(remote: &dyn RemoteLibrary, path: &Path) -> Result<String> {
///     let remote_id = remote.upload_song(path).await?;
///     remote.replace_playlist_entries("playlist-1", &[remote_id.clone()]).await?;
///     Ok(remote_id)
/// }
/// ```
#[async_trait]
pub trait RemoteLibrary: Send + Sync {
    /// Upload a local audio file, returning the id of the new remote song.
    async fn upload_song(&self, path: &Path) -> Result<RemoteId>;

    /// Overwrite the given metadata fields of a remote song.
    async fn update_song_metadata(&self, remote_id: &str, metadata: &SongMetadata) -> Result<()>;

    /// Delete a remote song.
    async fn delete_song(&self, remote_id: &str) -> Result<()>;

    /// Create an empty remote playlist, returning its id.
    async fn create_playlist(&self, name: &str) -> Result<RemoteId>;

    /// Rename a remote playlist.
    async fn rename_playlist(&self, remote_id: &str, name: &str) -> Result<()>;

    /// Delete a remote playlist.
    async fn delete_playlist(&self, remote_id: &str) -> Result<()>;

    /// Replace the entire ordered membership of a remote playlist.
    ///
    /// Implementations must leave the playlist containing exactly
    /// `song_ids`, in order, regardless of its previous contents.
    async fn replace_playlist_entries(&self, remote_id: &str, song_ids: &[RemoteId]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use mockall::mock;
    use serde_json::json;

    mock! {
        Remote {}

        #[async_trait]
        impl RemoteLibrary for Remote {
            async fn upload_song(&self, path: &Path) -> Result<RemoteId>;
            async fn update_song_metadata(&self, remote_id: &str, metadata: &SongMetadata) -> Result<()>;
            async fn delete_song(&self, remote_id: &str) -> Result<()>;
            async fn create_playlist(&self, name: &str) -> Result<RemoteId>;
            async fn rename_playlist(&self, remote_id: &str, name: &str) -> Result<()>;
            async fn delete_playlist(&self, remote_id: &str) -> Result<()>;
            async fn replace_playlist_entries(&self, remote_id: &str, song_ids: &[RemoteId]) -> Result<()>;
        }
    }

    #[test]
    fn test_song_metadata_builder() {
        let metadata = SongMetadata::new()
            .with_field("artist", json!("Nina Simone"))
            .with_field("rating", json!(5));

        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get("artist"), Some(&json!("Nina Simone")));
        assert!(metadata.get("album").is_none());

        let keys: Vec<&String> = metadata.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["artist", "rating"]);
    }

    #[tokio::test]
    async fn test_remote_library_is_object_safe() {
        let mut remote = MockRemote::new();
        remote
            .expect_create_playlist()
            .withf(|name| name == "Road Trip")
            .returning(|_| Ok("pl-1".to_string()));
        remote
            .expect_delete_song()
            .returning(|id| Err(BridgeError::remote("delete_song", format!("{id} not found"))));

        let remote: Box<dyn RemoteLibrary> = Box::new(remote);
        assert_eq!(remote.create_playlist("Road Trip").await.unwrap(), "pl-1");

        let err = remote.delete_song("s-9").await.unwrap_err();
        assert_eq!(err.to_string(), "Remote call failed: delete_song: s-9 not found");
    }
}
