//! # Trigger Installer
//!
//! Installs the SQLite triggers that record every watched mutation in the
//! change log table, and removes them again.
//!
//! ## Overview
//!
//! For each [`WatchedChange`] one trigger is created:
//!
//! ```sql
//! CREATE TRIGGER IF NOT EXISTS "mpsync_home_update_song"
//! AFTER UPDATE OF "Artist", "Album" ON "Songs"
//! BEGIN
//!     INSERT INTO "mpsync_home_changes" (change_type, local_id) VALUES (1, NEW."ID");
//! END
//! ```
//!
//! The insert runs inside the transaction of the mutation that fired it, so
//! the change id reflects commit order. Every name is namespaced per
//! configuration and passes the [`SqlIdent`] allow-list before it is
//! interpolated; the only literals in the DDL are integer ordinals.
//!
//! Installation is a configuration-time operation. Errors are logged and
//! reported as `false`; nothing is retried beyond the session's lock retry.
//!
//! The change log uses a plain `INTEGER PRIMARY KEY`. `AUTOINCREMENT` would
//! make SQLite create `sqlite_sequence`, which cannot be dropped again. Ids
//! stay monotonic because nothing deletes rows; across a reinstall a
//! watermark row ([`WATERMARK_ORDINAL`]) carries the high-water mark.

use crate::change::ChangeType;
use crate::change_log::{ChangeLog, WATERMARK_ORDINAL};
use crate::error::{Result, SyncError};
use core_library::ident::join_idents;
use core_library::{LocalSession, SqlIdent};
use std::collections::HashSet;
use std::fmt;
use tracing::{error, info, instrument};

const NAMESPACE_PREFIX: &str = "mpsync";

/// Prefix shared by every schema object one configuration installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(SqlIdent);

impl Namespace {
    /// `mpsync_<name>`, with every character outside `[A-Za-z0-9]` replaced by `_`.
    pub fn for_profile(name: &str) -> Result<Self> {
        let sanitized: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();

        SqlIdent::new(format!("{NAMESPACE_PREFIX}_{sanitized}"))
            .map(Self)
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))
    }

    pub fn as_ident(&self) -> &SqlIdent {
        &self.0
    }

    pub fn change_log_table(&self) -> Result<SqlIdent> {
        self.suffixed("changes")
    }

    pub fn trigger_name(&self, change_type: ChangeType) -> Result<SqlIdent> {
        self.suffixed(change_type.slug())
    }

    fn suffixed(&self, suffix: &str) -> Result<SqlIdent> {
        self.0
            .suffixed(suffix)
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Which mutation fires a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    Insert,
    /// Update touching at least one of the listed columns
    UpdateOf(Vec<SqlIdent>),
    Delete,
}

/// Where the affected local id is read from inside the trigger body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRef {
    New(SqlIdent),
    Old(SqlIdent),
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRef::New(column) => write!(f, "NEW.{column}"),
            RowRef::Old(column) => write!(f, "OLD.{column}"),
        }
    }
}

/// A change type together with the trigger that captures it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedChange {
    pub change_type: ChangeType,
    pub table: SqlIdent,
    pub event: TriggerEvent,
    pub local_id: RowRef,
}

impl WatchedChange {
    pub fn new(change_type: ChangeType, table: SqlIdent, event: TriggerEvent, local_id: RowRef) -> Self {
        Self {
            change_type,
            table,
            event,
            local_id,
        }
    }
}

/// Creates and drops the change log table and its triggers for one
/// configuration.
#[derive(Debug, Clone)]
pub struct TriggerInstaller {
    namespace: Namespace,
    change_log: SqlIdent,
    watched: Vec<WatchedChange>,
}

impl TriggerInstaller {
    /// # Errors
    ///
    /// `SyncError::InvalidConfig` if the list is empty, names a change type
    /// twice, has an update trigger without columns, or pairs a delete
    /// trigger with `NEW` / an insert trigger with `OLD`.
    pub fn new(namespace: Namespace, watched: Vec<WatchedChange>) -> Result<Self> {
        if watched.is_empty() {
            return Err(SyncError::InvalidConfig(
                "at least one change type must be watched".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for change in &watched {
            if !seen.insert(change.change_type) {
                return Err(SyncError::InvalidConfig(format!(
                    "change type {} is watched twice",
                    change.change_type
                )));
            }
            match (&change.event, &change.local_id) {
                (TriggerEvent::UpdateOf(columns), _) if columns.is_empty() => {
                    return Err(SyncError::InvalidConfig(format!(
                        "update trigger for {} lists no columns",
                        change.change_type
                    )));
                }
                (TriggerEvent::Delete, RowRef::New(_)) | (TriggerEvent::Insert, RowRef::Old(_)) => {
                    return Err(SyncError::InvalidConfig(format!(
                        "trigger for {} reads a row that does not exist for its event",
                        change.change_type
                    )));
                }
                _ => {}
            }
        }

        let change_log = namespace.change_log_table()?;
        Ok(Self {
            namespace,
            change_log,
            watched,
        })
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn change_log_table(&self) -> &SqlIdent {
        &self.change_log
    }

    pub fn watched(&self) -> &[WatchedChange] {
        &self.watched
    }

    /// DDL for the change log table. `change_type` is checked against the
    /// configured ordinals and the watermark.
    pub fn change_log_ddl(&self) -> String {
        let mut ordinals: Vec<i64> = self
            .watched
            .iter()
            .map(|w| w.change_type.ordinal())
            .chain([WATERMARK_ORDINAL])
            .collect();
        ordinals.sort_unstable();
        let allowed = ordinals
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             change_id INTEGER PRIMARY KEY, \
             change_type INTEGER NOT NULL CHECK (change_type IN ({})), \
             local_id INTEGER NOT NULL)",
            self.change_log, allowed
        )
    }

    pub fn trigger_ddl(&self, change: &WatchedChange) -> Result<String> {
        let name = self.namespace.trigger_name(change.change_type)?;
        let event = match &change.event {
            TriggerEvent::Insert => "INSERT".to_string(),
            TriggerEvent::UpdateOf(columns) => format!("UPDATE OF {}", join_idents(columns)),
            TriggerEvent::Delete => "DELETE".to_string(),
        };

        Ok(format!(
            "CREATE TRIGGER IF NOT EXISTS {name} AFTER {event} ON {table} \
             BEGIN INSERT INTO {log} (change_type, local_id) VALUES ({ordinal}, {local_id}); END",
            table = change.table,
            log = self.change_log,
            ordinal = change.change_type.ordinal(),
            local_id = change.local_id,
        ))
    }

    /// Create the change log table and one trigger per watched change.
    ///
    /// All-or-nothing: on any failure everything is detached again and
    /// `false` is returned.
    #[instrument(skip(self, session), fields(namespace = %self.namespace))]
    pub async fn attach(&self, session: &mut LocalSession) -> bool {
        match self.try_attach(session).await {
            Ok(()) => {
                info!(triggers = self.watched.len(), "Change capture attached");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to attach change capture; rolling back");
                if !self.detach(session).await {
                    error!("Rollback after failed attach did not complete");
                }
                false
            }
        }
    }

    /// Drop every trigger this namespace could have installed and the change
    /// log table. Absent objects are not an error.
    #[instrument(skip(self, session), fields(namespace = %self.namespace))]
    pub async fn detach(&self, session: &mut LocalSession) -> bool {
        match self.try_detach(session).await {
            Ok(()) => {
                info!("Change capture detached");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to detach change capture");
                false
            }
        }
    }

    /// Replace the installed triggers with the current definitions.
    ///
    /// Change ids continue above the highest id of the previous change log.
    pub async fn reattach(&self, session: &mut LocalSession) -> bool {
        self.reattach_above(session, 0).await
    }

    /// Like [`reattach`](Self::reattach), but new change ids also start
    /// above `floor`, typically the checkpoint recorded for this namespace.
    #[instrument(skip(self, session), fields(namespace = %self.namespace))]
    pub async fn reattach_above(&self, session: &mut LocalSession, floor: i64) -> bool {
        let latest = match self.latest_change_id(session).await {
            Ok(latest) => latest,
            Err(e) => {
                error!(error = %e, "Could not read change id high-water mark");
                return false;
            }
        };

        if !self.detach(session).await || !self.attach(session).await {
            return false;
        }

        let high_water = latest.unwrap_or(0).max(floor);
        if high_water > 0 {
            if let Err(e) = self.write_watermark(session, high_water).await {
                error!(error = %e, "Could not record change id high-water mark; detaching");
                self.detach(session).await;
                return false;
            }
        }
        true
    }

    /// Whether the change log table currently exists.
    pub async fn is_attached(&self, session: &mut LocalSession) -> Result<bool> {
        let table = self.change_log.as_str().to_string();
        let found = session
            .retrying("change log exists", move |conn| {
                let table = table.clone();
                Box::pin(async move {
                    sqlx::query_scalar::<_, i64>(
                        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
                    )
                    .bind(table)
                    .fetch_optional(conn)
                    .await
                })
            })
            .await?;
        Ok(found.is_some())
    }

    async fn try_attach(&self, session: &mut LocalSession) -> Result<()> {
        session.execute(&self.change_log_ddl()).await?;
        for change in &self.watched {
            let ddl = self.trigger_ddl(change)?;
            session.execute(&ddl).await?;
        }
        Ok(())
    }

    async fn try_detach(&self, session: &mut LocalSession) -> Result<()> {
        for change_type in ChangeType::ALL {
            let name = self.namespace.trigger_name(change_type)?;
            session
                .execute(&format!("DROP TRIGGER IF EXISTS {name}"))
                .await?;
        }
        session
            .execute(&format!("DROP TABLE IF EXISTS {}", self.change_log))
            .await?;
        Ok(())
    }

    async fn latest_change_id(&self, session: &mut LocalSession) -> Result<Option<i64>> {
        if !self.is_attached(session).await? {
            return Ok(None);
        }
        ChangeLog::new(self.change_log.clone())
            .latest_change_id(session)
            .await
    }

    async fn write_watermark(&self, session: &mut LocalSession, change_id: i64) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (change_id, change_type, local_id) VALUES (?, {}, 0)",
            self.change_log, WATERMARK_ORDINAL
        );
        session
            .retrying("write change id watermark", move |conn| {
                let sql = sql.clone();
                Box::pin(async move {
                    sqlx::query(&sql).bind(change_id).execute(conn).await?;
                    Ok(())
                })
            })
            .await?;
        Ok(())
    }
}
