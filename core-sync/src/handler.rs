//! # Change Handlers
//!
//! A handler pushes one change log entry to the remote library. It may read
//! the local database and the id mapping store, but it never writes to
//! either: create and delete handlers report a [`HandlerOutcome`] and the
//! dispatcher applies it.
//!
//! ## Contract
//!
//! - Update handlers must be idempotent. Re-applying one after a crash must
//!   leave the remote in the same state.
//! - A local row that no longer exists is [`SyncError::StaleLocal`]; a
//!   missing remote id is [`SyncError::UnmappedId`]. Neither is retried.
//! - Membership changes replace the remote playlist's entries wholesale, so
//!   any number of add/remove/move entries converge on the local order.
//!
//! [`HandlerSet::handler_for`] is an exhaustive match over [`ChangeType`]:
//! adding a change type does not compile until it has a handler.

use crate::change::{ChangeType, HandlerOutcome, ItemType};
use crate::error::{Result, SyncError};
use crate::handlers::{
    CreatePlaylistHandler, CreateSongHandler, DeletePlaylistHandler, DeleteSongHandler,
    PlaylistMembershipHandler, RenamePlaylistHandler, UpdateSongHandler,
};
use crate::id_map::IdMappingStore;
use crate::metadata::MetadataMapping;
use async_trait::async_trait;
use bridge_traits::RemoteLibrary;
use core_library::{LibrarySchema, LocalSession};

/// Everything a handler may touch while processing one entry.
pub struct HandlerContext<'a> {
    /// Primary key of the affected local row
    pub local_id: i64,
    pub remote: &'a dyn RemoteLibrary,
    pub local: &'a mut LocalSession,
    pub ids: &'a dyn IdMappingStore,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        local_id: i64,
        remote: &'a dyn RemoteLibrary,
        local: &'a mut LocalSession,
        ids: &'a dyn IdMappingStore,
    ) -> Self {
        Self {
            local_id,
            remote,
            local,
            ids,
        }
    }

    /// Remote id of the entry's own item.
    pub async fn resolve_own(&self, item_type: ItemType) -> Result<String> {
        self.ids.resolve(item_type, self.local_id).await
    }

    pub fn stale(&self, item_type: ItemType, reason: impl Into<String>) -> SyncError {
        SyncError::stale(item_type, self.local_id, reason)
    }
}

#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Push the change; `Some` for handlers that created or destroyed a
    /// remote object.
    async fn push(&self, ctx: &mut HandlerContext<'_>) -> Result<Option<HandlerOutcome>>;
}

/// The handler for every change type.
#[derive(Debug, Clone)]
pub struct HandlerSet {
    create_song: CreateSongHandler,
    update_song: UpdateSongHandler,
    delete_song: DeleteSongHandler,
    create_playlist: CreatePlaylistHandler,
    rename_playlist: RenamePlaylistHandler,
    delete_playlist: DeletePlaylistHandler,
    membership: PlaylistMembershipHandler,
}

impl HandlerSet {
    pub fn for_library(schema: &LibrarySchema, metadata: Vec<MetadataMapping>) -> Self {
        Self {
            create_song: CreateSongHandler::new(schema.songs.clone()),
            update_song: UpdateSongHandler::new(schema.songs.clone(), metadata),
            delete_song: DeleteSongHandler,
            create_playlist: CreatePlaylistHandler::new(schema),
            rename_playlist: RenamePlaylistHandler::new(schema),
            delete_playlist: DeletePlaylistHandler,
            membership: PlaylistMembershipHandler::new(schema),
        }
    }

    pub fn handler_for(&self, change_type: ChangeType) -> &dyn ChangeHandler {
        match change_type {
            ChangeType::CreateSong => &self.create_song,
            ChangeType::UpdateSong => &self.update_song,
            ChangeType::DeleteSong => &self.delete_song,
            ChangeType::CreatePlaylist => &self.create_playlist,
            ChangeType::RenamePlaylist => &self.rename_playlist,
            ChangeType::DeletePlaylist => &self.delete_playlist,
            ChangeType::PlaylistEntryAdded
            | ChangeType::PlaylistEntryRemoved
            | ChangeType::PlaylistEntryMoved => &self.membership,
        }
    }
}
