use crate::change::{HandlerOutcome, ItemType};
use crate::error::{Result, SyncError};
use crate::handler::{ChangeHandler, HandlerContext};
use async_trait::async_trait;
use bridge_traits::RemoteId;
use core_library::repositories::PlaylistRepository;
use core_library::LibrarySchema;
use tracing::debug;

fn repository(schema: &LibrarySchema) -> PlaylistRepository {
    PlaylistRepository::new(schema.playlists.clone(), schema.playlist_entries.clone())
}

#[derive(Debug, Clone)]
pub struct CreatePlaylistHandler {
    playlists: PlaylistRepository,
}

impl CreatePlaylistHandler {
    pub fn new(schema: &LibrarySchema) -> Self {
        Self {
            playlists: repository(schema),
        }
    }
}

#[async_trait]
impl ChangeHandler for CreatePlaylistHandler {
    async fn push(&self, ctx: &mut HandlerContext<'_>) -> Result<Option<HandlerOutcome>> {
        let name = self
            .playlists
            .name(ctx.local, ctx.local_id)
            .await?
            .ok_or_else(|| ctx.stale(ItemType::Playlist, "playlist row is gone"))?;

        let remote_id = ctx.remote.create_playlist(&name).await?;
        Ok(Some(HandlerOutcome::created(ItemType::Playlist, remote_id)))
    }
}

/// Sends the current local name, so replaying it is harmless.
#[derive(Debug, Clone)]
pub struct RenamePlaylistHandler {
    playlists: PlaylistRepository,
}

impl RenamePlaylistHandler {
    pub fn new(schema: &LibrarySchema) -> Self {
        Self {
            playlists: repository(schema),
        }
    }
}

#[async_trait]
impl ChangeHandler for RenamePlaylistHandler {
    async fn push(&self, ctx: &mut HandlerContext<'_>) -> Result<Option<HandlerOutcome>> {
        let name = self
            .playlists
            .name(ctx.local, ctx.local_id)
            .await?
            .ok_or_else(|| ctx.stale(ItemType::Playlist, "playlist row is gone"))?;

        let remote_id = ctx.resolve_own(ItemType::Playlist).await?;
        ctx.remote.rename_playlist(&remote_id, &name).await?;
        Ok(None)
    }
}

/// Deletes the remote playlist without reading the (deleted) local row.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeletePlaylistHandler;

#[async_trait]
impl ChangeHandler for DeletePlaylistHandler {
    async fn push(&self, ctx: &mut HandlerContext<'_>) -> Result<Option<HandlerOutcome>> {
        let remote_id = ctx.resolve_own(ItemType::Playlist).await?;
        ctx.remote.delete_playlist(&remote_id).await?;
        Ok(Some(HandlerOutcome::deleted(ItemType::Playlist, remote_id)))
    }
}

/// Makes the remote playlist's entries equal the local ones, in local
/// order. Handles added, removed and moved entries alike.
///
/// Every member must already be mapped; if one is not, nothing is sent.
#[derive(Debug, Clone)]
pub struct PlaylistMembershipHandler {
    playlists: PlaylistRepository,
}

impl PlaylistMembershipHandler {
    pub fn new(schema: &LibrarySchema) -> Self {
        Self {
            playlists: repository(schema),
        }
    }
}

#[async_trait]
impl ChangeHandler for PlaylistMembershipHandler {
    async fn push(&self, ctx: &mut HandlerContext<'_>) -> Result<Option<HandlerOutcome>> {
        if !self.playlists.exists(ctx.local, ctx.local_id).await? {
            return Err(ctx.stale(ItemType::Playlist, "playlist row is gone"));
        }

        let remote_playlist = ctx.resolve_own(ItemType::Playlist).await?;
        let song_ids = self.playlists.song_ids(ctx.local, ctx.local_id).await?;

        let mut members: Vec<RemoteId> = Vec::with_capacity(song_ids.len());
        for song_id in song_ids {
            match ctx.ids.lookup(ItemType::Song, song_id).await? {
                Some(remote_id) => members.push(remote_id),
                None => {
                    return Err(SyncError::UnmappedId {
                        item_type: ItemType::Song,
                        local_id: song_id,
                    })
                }
            }
        }

        debug!(
            local_id = ctx.local_id,
            remote_id = %remote_playlist,
            members = members.len(),
            "Replacing playlist entries"
        );
        ctx.remote
            .replace_playlist_entries(&remote_playlist, &members)
            .await?;
        Ok(None)
    }
}
