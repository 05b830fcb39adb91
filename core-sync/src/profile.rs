//! # Player Profiles
//!
//! Everything player-specific lives here as data: the library schema, the
//! triggers that capture changes, the metadata mapping and the collations
//! the player's database needs registered before its text indexes can be
//! queried.

use crate::change::ChangeType;
use crate::error::{Result, SyncError};
use crate::handler::HandlerSet;
use crate::metadata::{self, MetadataMapping, ValueTransform};
use crate::trigger::{Namespace, RowRef, TriggerEvent, TriggerInstaller, WatchedChange};
use core_library::{LibrarySchema, LocalDatabaseConfig, LockRetryPolicy, SqlIdent};
use core_runtime::config::{PlayerKind, SyncEngineConfig};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PlayerProfile {
    pub kind: PlayerKind,
    pub schema: LibrarySchema,
    pub watched: Vec<WatchedChange>,
    pub metadata: Vec<MetadataMapping>,
    /// Collations registered as case-insensitive on every local connection
    pub collations: Vec<String>,
}

impl PlayerProfile {
    pub fn from_kind(kind: PlayerKind) -> Result<Self> {
        match kind {
            PlayerKind::MediaMonkey => Self::mediamonkey(),
        }
    }

    pub fn mediamonkey() -> Result<Self> {
        let schema = LibrarySchema::mediamonkey()?;
        let metadata = mediamonkey_metadata()?;

        let songs = &schema.songs;
        let playlists = &schema.playlists;
        let entries = &schema.playlist_entries;

        let watched = vec![
            WatchedChange::new(
                ChangeType::CreateSong,
                songs.table.clone(),
                TriggerEvent::Insert,
                RowRef::New(songs.id.clone()),
            ),
            WatchedChange::new(
                ChangeType::UpdateSong,
                songs.table.clone(),
                TriggerEvent::UpdateOf(metadata::columns(&metadata)),
                RowRef::New(songs.id.clone()),
            ),
            WatchedChange::new(
                ChangeType::DeleteSong,
                songs.table.clone(),
                TriggerEvent::Delete,
                RowRef::Old(songs.id.clone()),
            ),
            WatchedChange::new(
                ChangeType::CreatePlaylist,
                playlists.table.clone(),
                TriggerEvent::Insert,
                RowRef::New(playlists.id.clone()),
            ),
            WatchedChange::new(
                ChangeType::RenamePlaylist,
                playlists.table.clone(),
                TriggerEvent::UpdateOf(vec![playlists.name.clone()]),
                RowRef::New(playlists.id.clone()),
            ),
            WatchedChange::new(
                ChangeType::DeletePlaylist,
                playlists.table.clone(),
                TriggerEvent::Delete,
                RowRef::Old(playlists.id.clone()),
            ),
            WatchedChange::new(
                ChangeType::PlaylistEntryAdded,
                entries.table.clone(),
                TriggerEvent::Insert,
                RowRef::New(entries.playlist_id.clone()),
            ),
            WatchedChange::new(
                ChangeType::PlaylistEntryRemoved,
                entries.table.clone(),
                TriggerEvent::Delete,
                RowRef::Old(entries.playlist_id.clone()),
            ),
            WatchedChange::new(
                ChangeType::PlaylistEntryMoved,
                entries.table.clone(),
                TriggerEvent::UpdateOf(vec![entries.order.clone()]),
                RowRef::New(entries.playlist_id.clone()),
            ),
        ];

        Ok(Self {
            kind: PlayerKind::MediaMonkey,
            schema,
            watched,
            metadata,
            collations: vec!["IUNICODE".to_string()],
        })
    }

    pub fn installer(&self, namespace: Namespace) -> Result<TriggerInstaller> {
        TriggerInstaller::new(namespace, self.watched.clone())
    }

    pub fn handlers(&self) -> HandlerSet {
        HandlerSet::for_library(&self.schema, self.metadata.clone())
    }

    /// Connection settings for the player's database at `path`.
    pub fn database_config(&self, path: &Path, engine: &SyncEngineConfig) -> LocalDatabaseConfig {
        let retry = LockRetryPolicy::new(
            engine.lock_retry_attempts,
            engine.lock_retry_base_delay,
            engine.lock_retry_max_delay,
        );
        self.collations.iter().fold(
            LocalDatabaseConfig::new(path)
                .busy_timeout(engine.busy_timeout)
                .retry(retry),
            |config, name| config.collation(name.clone()),
        )
    }
}

fn mediamonkey_metadata() -> Result<Vec<MetadataMapping>> {
    let pairs = [
        ("Artist", "artist"),
        ("Album", "album"),
        ("AlbumArtist", "albumArtist"),
        ("Comment", "comment"),
        ("Genre", "genre"),
        ("Rating", "rating"),
        ("Year", "year"),
        ("DiscNumber", "disc"),
        ("TrackNumber", "track"),
        ("BPM", "beatsPerMinute"),
        ("SongTitle", "name"),
    ];

    pairs
        .into_iter()
        .map(|(column, key)| {
            let column = SqlIdent::new(column).map_err(SyncError::from)?;
            let mapping = MetadataMapping::new(column, key);
            Ok(if key == "rating" {
                mapping.with_transform(ValueTransform::Rating)
            } else {
                mapping
            })
        })
        .collect()
}
