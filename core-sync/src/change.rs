//! # Change Model
//!
//! The watched change types, the entries triggers write for them, and what a
//! handler reports back after pushing one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of item with a remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Song,
    Playlist,
}

impl ItemType {
    pub const ALL: [ItemType; 2] = [ItemType::Song, ItemType::Playlist];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Song => "song",
            ItemType::Playlist => "playlist",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (operation, entity) pair the engine watches.
///
/// The ordinal is what triggers store in the change log; it must never be
/// reassigned once a change log has been populated with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    CreateSong,
    UpdateSong,
    DeleteSong,
    CreatePlaylist,
    RenamePlaylist,
    DeletePlaylist,
    /// A song was added to a playlist; the logged id is the playlist's
    PlaylistEntryAdded,
    /// A song was removed from a playlist; the logged id is the playlist's
    PlaylistEntryRemoved,
    /// A playlist entry changed position; the logged id is the playlist's
    PlaylistEntryMoved,
}

impl ChangeType {
    pub const ALL: [ChangeType; 9] = [
        ChangeType::CreateSong,
        ChangeType::UpdateSong,
        ChangeType::DeleteSong,
        ChangeType::CreatePlaylist,
        ChangeType::RenamePlaylist,
        ChangeType::DeletePlaylist,
        ChangeType::PlaylistEntryAdded,
        ChangeType::PlaylistEntryRemoved,
        ChangeType::PlaylistEntryMoved,
    ];

    pub fn ordinal(self) -> i64 {
        match self {
            ChangeType::CreateSong => 0,
            ChangeType::UpdateSong => 1,
            ChangeType::DeleteSong => 2,
            ChangeType::CreatePlaylist => 3,
            ChangeType::RenamePlaylist => 4,
            ChangeType::DeletePlaylist => 5,
            ChangeType::PlaylistEntryAdded => 6,
            ChangeType::PlaylistEntryRemoved => 7,
            ChangeType::PlaylistEntryMoved => 8,
        }
    }

    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|ct| ct.ordinal() == ordinal)
    }

    /// Stable lowercase name, used in trigger names and logs.
    pub fn slug(self) -> &'static str {
        match self {
            ChangeType::CreateSong => "create_song",
            ChangeType::UpdateSong => "update_song",
            ChangeType::DeleteSong => "delete_song",
            ChangeType::CreatePlaylist => "create_playlist",
            ChangeType::RenamePlaylist => "rename_playlist",
            ChangeType::DeletePlaylist => "delete_playlist",
            ChangeType::PlaylistEntryAdded => "playlist_entry_added",
            ChangeType::PlaylistEntryRemoved => "playlist_entry_removed",
            ChangeType::PlaylistEntryMoved => "playlist_entry_moved",
        }
    }

    /// Item type the logged local id refers to.
    pub fn item_type(self) -> ItemType {
        match self {
            ChangeType::CreateSong | ChangeType::UpdateSong | ChangeType::DeleteSong => {
                ItemType::Song
            }
            ChangeType::CreatePlaylist
            | ChangeType::RenamePlaylist
            | ChangeType::DeletePlaylist
            | ChangeType::PlaylistEntryAdded
            | ChangeType::PlaylistEntryRemoved
            | ChangeType::PlaylistEntryMoved => ItemType::Playlist,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// A decoded change log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeLogEntry {
    /// Monotonic id assigned by the local database
    pub change_id: i64,
    pub change_type: ChangeType,
    /// Primary key of the affected local row
    pub local_id: i64,
}

/// Whether a handler created or destroyed a remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerAction {
    Create,
    Delete,
}

/// Reported by create/delete handlers so the id mapping store can follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    pub action: HandlerAction,
    pub item_type: ItemType,
    pub remote_id: String,
}

impl HandlerOutcome {
    pub fn created(item_type: ItemType, remote_id: impl Into<String>) -> Self {
        Self {
            action: HandlerAction::Create,
            item_type,
            remote_id: remote_id.into(),
        }
    }

    pub fn deleted(item_type: ItemType, remote_id: impl Into<String>) -> Self {
        Self {
            action: HandlerAction::Delete,
            item_type,
            remote_id: remote_id.into(),
        }
    }
}
