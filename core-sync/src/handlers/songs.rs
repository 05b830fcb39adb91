use crate::change::{HandlerOutcome, ItemType};
use crate::error::Result;
use crate::handler::{ChangeHandler, HandlerContext};
use crate::metadata::{self, MetadataMapping};
use async_trait::async_trait;
use core_library::repositories::SongRepository;
use core_library::schema::SongTable;
use core_library::SqlIdent;
use core_runtime::logging::strip_path;
use std::path::Path;
use tracing::debug;

/// Uploads the song's file.
#[derive(Debug, Clone)]
pub struct CreateSongHandler {
    songs: SongRepository,
}

impl CreateSongHandler {
    pub fn new(table: SongTable) -> Self {
        Self {
            songs: SongRepository::new(table),
        }
    }
}

#[async_trait]
impl ChangeHandler for CreateSongHandler {
    async fn push(&self, ctx: &mut HandlerContext<'_>) -> Result<Option<HandlerOutcome>> {
        let path = self
            .songs
            .path(ctx.local, ctx.local_id)
            .await?
            .ok_or_else(|| ctx.stale(ItemType::Song, "song row, file path or media is gone"))?;

        debug!(local_id = ctx.local_id, file = %strip_path(&path), "Uploading song");
        let remote_id = ctx.remote.upload_song(Path::new(&path)).await?;
        Ok(Some(HandlerOutcome::created(ItemType::Song, remote_id)))
    }
}

/// Sends the mapped metadata columns. Sends all of them every time, so
/// replaying it is harmless.
#[derive(Debug, Clone)]
pub struct UpdateSongHandler {
    songs: SongRepository,
    mappings: Vec<MetadataMapping>,
    columns: Vec<SqlIdent>,
}

impl UpdateSongHandler {
    pub fn new(table: SongTable, mappings: Vec<MetadataMapping>) -> Self {
        let columns = metadata::columns(&mappings);
        Self {
            songs: SongRepository::new(table),
            mappings,
            columns,
        }
    }
}

#[async_trait]
impl ChangeHandler for UpdateSongHandler {
    async fn push(&self, ctx: &mut HandlerContext<'_>) -> Result<Option<HandlerOutcome>> {
        let values = self
            .songs
            .columns(ctx.local, ctx.local_id, &self.columns)
            .await?
            .ok_or_else(|| ctx.stale(ItemType::Song, "song row is gone"))?;

        let remote_id = ctx.resolve_own(ItemType::Song).await?;
        let metadata = metadata::to_remote(&self.mappings, &values);
        ctx.remote.update_song_metadata(&remote_id, &metadata).await?;
        Ok(None)
    }
}

/// Deletes the remote song. The local row is already gone and is not read.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteSongHandler;

#[async_trait]
impl ChangeHandler for DeleteSongHandler {
    async fn push(&self, ctx: &mut HandlerContext<'_>) -> Result<Option<HandlerOutcome>> {
        let remote_id = ctx.resolve_own(ItemType::Song).await?;
        ctx.remote.delete_song(&remote_id).await?;
        Ok(Some(HandlerOutcome::deleted(ItemType::Song, remote_id)))
    }
}
