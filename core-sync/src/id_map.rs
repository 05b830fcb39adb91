//! # Id Mapping Store
//!
//! Persistent `(item type, local id) -> remote id` map. Lives in the
//! engine's own SQLite file, never in the media player's database.

use crate::change::{HandlerAction, HandlerOutcome, ItemType};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use core_library::db::{create_pool, DatabaseConfig};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, info};

#[async_trait]
pub trait IdMappingStore: Send + Sync {
    /// Remote id of a local item, if one is recorded.
    async fn lookup(&self, item_type: ItemType, local_id: i64) -> Result<Option<String>>;

    /// Insert or overwrite a mapping.
    async fn upsert(&self, item_type: ItemType, local_id: i64, remote_id: &str) -> Result<()>;

    /// Remove a mapping. Removing an absent mapping succeeds.
    async fn remove(&self, item_type: ItemType, local_id: i64) -> Result<()>;

    /// Remote id of a local item.
    ///
    /// # Errors
    ///
    /// `SyncError::UnmappedId` if no mapping is recorded.
    async fn resolve(&self, item_type: ItemType, local_id: i64) -> Result<String> {
        self.lookup(item_type, local_id)
            .await?
            .ok_or(SyncError::UnmappedId { item_type, local_id })
    }

    /// Record what a create or delete handler reported.
    async fn apply(&self, local_id: i64, outcome: &HandlerOutcome) -> Result<()> {
        match outcome.action {
            HandlerAction::Create => {
                self.upsert(outcome.item_type, local_id, &outcome.remote_id)
                    .await
            }
            HandlerAction::Delete => self.remove(outcome.item_type, local_id).await,
        }
    }
}

fn table_for(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Song => "song_ids",
        ItemType::Playlist => "playlist_ids",
    }
}

/// SQLite implementation of [`IdMappingStore`].
#[derive(Clone)]
pub struct SqliteIdMappingStore {
    pool: SqlitePool,
}

impl SqliteIdMappingStore {
    /// Open (creating if needed) the mapping database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = create_pool(DatabaseConfig::new(path)).await?;
        Self::with_pool(pool).await
    }

    /// A throwaway store, for tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        let pool = create_pool(DatabaseConfig::in_memory()).await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        for item_type in ItemType::ALL {
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 local_id INTEGER PRIMARY KEY, \
                 remote_id TEXT NOT NULL)",
                table_for(item_type)
            );
            sqlx::query(&sql).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Forget every mapping, e.g. after the change capture was re-created
    /// from scratch.
    pub async fn reset(&self) -> Result<()> {
        for item_type in ItemType::ALL {
            sqlx::query(&format!("DELETE FROM {}", table_for(item_type)))
                .execute(&self.pool)
                .await?;
        }
        info!("Id mappings reset");
        Ok(())
    }

    pub async fn count(&self, item_type: ItemType) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM {}",
            table_for(item_type)
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl IdMappingStore for SqliteIdMappingStore {
    async fn lookup(&self, item_type: ItemType, local_id: i64) -> Result<Option<String>> {
        let remote_id = sqlx::query_scalar::<_, String>(&format!(
            "SELECT remote_id FROM {} WHERE local_id = ?",
            table_for(item_type)
        ))
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(remote_id)
    }

    async fn upsert(&self, item_type: ItemType, local_id: i64, remote_id: &str) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (local_id, remote_id) VALUES (?, ?) \
             ON CONFLICT(local_id) DO UPDATE SET remote_id = excluded.remote_id",
            table_for(item_type)
        ))
        .bind(local_id)
        .bind(remote_id)
        .execute(&self.pool)
        .await?;

        debug!(%item_type, local_id, remote_id, "Mapping recorded");
        Ok(())
    }

    async fn remove(&self, item_type: ItemType, local_id: i64) -> Result<()> {
        let done = sqlx::query(&format!(
            "DELETE FROM {} WHERE local_id = ?",
            table_for(item_type)
        ))
        .bind(local_id)
        .execute(&self.pool)
        .await?;

        debug!(
            %item_type,
            local_id,
            removed = done.rows_affected() > 0,
            "Mapping removed"
        );
        Ok(())
    }
}
