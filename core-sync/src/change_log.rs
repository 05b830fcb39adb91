//! Reads the change log table written by the triggers.
//!
//! The engine only selects rows above the checkpoint in ascending
//! `change_id` order. The one row it writes itself is the watermark left by
//! a reinstall, which is never dispatched.

use crate::change::{ChangeLogEntry, ChangeType};
use crate::error::{Result, SyncError};
use core_library::{LocalSession, SqlIdent};
use sqlx::FromRow;

/// `change_type` of the row that carries the change id high-water mark
/// across a reinstall of the triggers.
pub const WATERMARK_ORDINAL: i64 = -1;

/// A change log row as stored, before its ordinal is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct ChangeRow {
    pub change_id: i64,
    pub change_type: i64,
    pub local_id: i64,
}

impl ChangeRow {
    /// # Errors
    ///
    /// `SyncError::Unexpected` if the ordinal names no known change type.
    pub fn decode(&self) -> Result<ChangeLogEntry> {
        let change_type = ChangeType::from_ordinal(self.change_type).ok_or_else(|| {
            SyncError::Unexpected(format!(
                "change {} has unknown change type ordinal {}",
                self.change_id, self.change_type
            ))
        })?;

        Ok(ChangeLogEntry {
            change_id: self.change_id,
            change_type,
            local_id: self.local_id,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChangeLog {
    table: SqlIdent,
}

impl ChangeLog {
    pub fn new(table: SqlIdent) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &SqlIdent {
        &self.table
    }

    /// Up to `limit` rows with `change_id > after`, oldest first. Watermark
    /// rows are skipped.
    pub async fn fetch_after(
        &self,
        session: &mut LocalSession,
        after: i64,
        limit: u32,
    ) -> Result<Vec<ChangeRow>> {
        let sql = format!(
            "SELECT change_id, change_type, local_id FROM {} \
             WHERE change_id > ? AND change_type <> {} ORDER BY change_id ASC LIMIT ?",
            self.table, WATERMARK_ORDINAL
        );

        let rows = session
            .retrying("fetch changes", move |conn| {
                let sql = sql.clone();
                Box::pin(async move {
                    sqlx::query_as::<_, ChangeRow>(&sql)
                        .bind(after)
                        .bind(i64::from(limit))
                        .fetch_all(conn)
                        .await
                })
            })
            .await?;
        Ok(rows)
    }

    /// Highest change id in the table, watermark included.
    pub async fn latest_change_id(&self, session: &mut LocalSession) -> Result<Option<i64>> {
        let sql = format!("SELECT MAX(change_id) FROM {}", self.table);

        let latest = session
            .retrying("latest change id", move |conn| {
                let sql = sql.clone();
                Box::pin(async move {
                    sqlx::query_scalar::<_, Option<i64>>(&sql)
                        .fetch_one(conn)
                        .await
                })
            })
            .await?;
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_and_unknown_ordinals() {
        let row = ChangeRow {
            change_id: 4,
            change_type: ChangeType::RenamePlaylist.ordinal(),
            local_id: 7,
        };
        assert_eq!(
            row.decode().unwrap(),
            ChangeLogEntry {
                change_id: 4,
                change_type: ChangeType::RenamePlaylist,
                local_id: 7,
            }
        );

        let unknown = ChangeRow {
            change_id: 5,
            change_type: 42,
            local_id: 7,
        };
        let err = unknown.decode().unwrap_err();
        assert!(matches!(err, SyncError::Unexpected(_)));
        assert!(err.to_string().contains("ordinal 42"));
    }
}
