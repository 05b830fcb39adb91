use crate::db::LocalSession;
use crate::error::Result;
use crate::schema::{PlaylistEntryTable, PlaylistTable};

/// Reads playlists and their ordered membership.
#[derive(Debug, Clone)]
pub struct PlaylistRepository {
    playlists: PlaylistTable,
    entries: PlaylistEntryTable,
}

impl PlaylistRepository {
    pub fn new(playlists: PlaylistTable, entries: PlaylistEntryTable) -> Self {
        Self { playlists, entries }
    }

    /// The playlist's name; `None` if the playlist no longer exists.
    /// A NULL name reads as the empty string.
    pub async fn name(&self, session: &mut LocalSession, playlist_id: i64) -> Result<Option<String>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.playlists.name, self.playlists.table, self.playlists.id
        );

        let name = session
            .retrying("playlist name", move |conn| {
                let sql = sql.clone();
                Box::pin(async move {
                    sqlx::query_scalar::<_, Option<String>>(&sql)
                        .bind(playlist_id)
                        .fetch_optional(conn)
                        .await
                })
            })
            .await?;

        Ok(name.map(Option::unwrap_or_default))
    }

    pub async fn exists(&self, session: &mut LocalSession, playlist_id: i64) -> Result<bool> {
        Ok(self.name(session, playlist_id).await?.is_some())
    }

    /// Song ids of the playlist in play order. Ties in the order column fall
    /// back to insertion order.
    pub async fn song_ids(&self, session: &mut LocalSession, playlist_id: i64) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT {song} FROM {table} WHERE {playlist} = ? ORDER BY {order} ASC, {id} ASC",
            song = self.entries.song_id,
            table = self.entries.table,
            playlist = self.entries.playlist_id,
            order = self.entries.order,
            id = self.entries.id,
        );

        session
            .retrying("playlist entries", move |conn| {
                let sql = sql.clone();
                Box::pin(async move {
                    sqlx::query_scalar::<_, i64>(&sql)
                        .bind(playlist_id)
                        .fetch_all(conn)
                        .await
                })
            })
            .await
    }
}
