//! # Dispatcher
//!
//! The poll loop that drains the change log in `change_id` order and pushes
//! each entry through its handler.
//!
//! ## Cycle
//!
//! 1. Take the checkpoint from the in-memory cache, reading durable storage
//!    only at startup or after a failed write.
//! 2. Open a fresh local database session.
//! 3. Read up to `batch_size` entries above the checkpoint.
//! 4. For each entry, in order: run its handler, apply any
//!    [`HandlerOutcome`](crate::change::HandlerOutcome) to the id mapping
//!    store, then durably advance the checkpoint to the entry, whatever the
//!    handler's result was.
//! 5. Close the session. Start the next cycle immediately if entries were
//!    found, otherwise sleep for `poll_interval`.
//!
//! A failed entry is logged, counted and emitted as an event; it is never
//! retried. Cancellation is observed at the top of each cycle and before
//! each sleep, so a batch is always finished once started.
//!
//! A cycle that fails as a whole (the local database cannot be opened, the
//! change log stays locked, the checkpoint cannot be written) leaves the
//! checkpoint where it was durably stored and is retried after the sleep.

use crate::change::ChangeLogEntry;
use crate::change_log::{ChangeLog, ChangeRow};
use crate::checkpoint::CheckpointStore;
use crate::error::{FailureKind, Result, SyncError};
use crate::handler::{HandlerContext, HandlerSet};
use crate::id_map::IdMappingStore;
use bridge_traits::RemoteLibrary;
use core_library::{LocalDatabase, LocalSession};
use core_runtime::config::SyncEngineConfig;
use core_runtime::events::{CoreEvent, DispatcherEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Outcome counters since the dispatcher was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub cycles: u64,
    pub cycle_failures: u64,
    pub applied: u64,
    pub remote_call_failures: u64,
    pub stale_local: u64,
    pub unmapped_id: u64,
    pub database_locked: u64,
    pub unexpected: u64,
}

impl DispatchStats {
    fn record(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Applied => self.applied += 1,
            EntryOutcome::Failed(FailureKind::RemoteCallFailure) => self.remote_call_failures += 1,
            EntryOutcome::Failed(FailureKind::StaleLocal) => self.stale_local += 1,
            EntryOutcome::Failed(FailureKind::UnmappedId) => self.unmapped_id += 1,
            EntryOutcome::Failed(FailureKind::DatabaseLocked) => self.database_locked += 1,
            EntryOutcome::Failed(FailureKind::Unexpected) => self.unexpected += 1,
        }
    }

    /// Entries processed without remote effect.
    pub fn failed(&self) -> u64 {
        self.remote_call_failures
            + self.stale_local
            + self.unmapped_id
            + self.database_locked
            + self.unexpected
    }
}

/// Result of [`Dispatcher::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Non-empty batches processed
    pub batches: u32,
    pub applied: u64,
    pub failed: u64,
    /// Checkpoint after the drain
    pub checkpoint: i64,
}

impl DrainReport {
    pub fn processed(&self) -> u64 {
        self.applied + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Applied,
    Failed(FailureKind),
}

#[derive(Debug, Clone, Copy, Default)]
struct BatchSummary {
    entries: usize,
    applied: u64,
    failed: u64,
}

pub struct Dispatcher {
    config: SyncEngineConfig,
    database: LocalDatabase,
    change_log: ChangeLog,
    handlers: HandlerSet,
    remote: Arc<dyn RemoteLibrary>,
    ids: Arc<dyn IdMappingStore>,
    checkpoint: Arc<dyn CheckpointStore>,
    events: Option<EventBus>,
    cached_checkpoint: Option<i64>,
    stats: DispatchStats,
}

impl Dispatcher {
    /// # Errors
    ///
    /// `SyncError::InvalidConfig` if `config` does not validate.
    pub fn new(
        config: SyncEngineConfig,
        database: LocalDatabase,
        change_log: ChangeLog,
        handlers: HandlerSet,
        remote: Arc<dyn RemoteLibrary>,
        ids: Arc<dyn IdMappingStore>,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            config,
            database,
            change_log,
            handlers,
            remote,
            ids,
            checkpoint,
            events: None,
            cached_checkpoint: None,
            stats: DispatchStats::default(),
        })
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    /// Run cycles until `cancel` fires. Only cancellation ends the loop;
    /// cycle failures are logged and retried after `poll_interval`.
    #[instrument(skip(self, cancel), fields(change_log = %self.change_log.table().as_str()))]
    pub async fn run(&mut self, cancel: CancellationToken) -> DispatchStats {
        let start = match self.current_checkpoint().await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(error = %e, "Checkpoint unavailable at startup");
                0
            }
        };
        info!(checkpoint = start, "Dispatcher started");
        self.emit(DispatcherEvent::Started {
            namespace: self.change_log.table().as_str().to_string(),
            checkpoint: start,
        });

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let idle = match self.cycle().await {
                Ok(summary) => summary.entries == 0,
                Err(e) => {
                    self.cycle_failed(&e);
                    true
                }
            };
            if !idle {
                continue;
            }

            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(checkpoint = ?self.cached_checkpoint, "Dispatcher stopped");
        self.emit(DispatcherEvent::Stopped {
            checkpoint: self.cached_checkpoint,
        });
        self.stats.clone()
    }

    /// Process batches until the backlog is empty, without sleeping.
    ///
    /// # Errors
    ///
    /// The first cycle failure; entries processed before it stay processed.
    #[instrument(skip(self, cancel), fields(change_log = %self.change_log.table().as_str()))]
    pub async fn drain(&mut self, cancel: &CancellationToken) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        while !cancel.is_cancelled() {
            let summary = match self.cycle().await {
                Ok(summary) => summary,
                Err(e) => {
                    self.cycle_failed(&e);
                    return Err(e);
                }
            };
            if summary.entries == 0 {
                break;
            }
            report.batches += 1;
            report.applied += summary.applied;
            report.failed += summary.failed;
        }
        report.checkpoint = self.current_checkpoint().await?;
        Ok(report)
    }

    async fn cycle(&mut self) -> Result<BatchSummary> {
        self.stats.cycles += 1;
        let after = self.current_checkpoint().await?;

        let mut session = self.database.open().await?;
        let result = self.process_batch(&mut session, after).await;
        session.close().await;
        result
    }

    async fn process_batch(&mut self, session: &mut LocalSession, after: i64) -> Result<BatchSummary> {
        let rows = self
            .change_log
            .fetch_after(session, after, self.config.batch_size)
            .await?;

        let mut summary = BatchSummary {
            entries: rows.len(),
            ..BatchSummary::default()
        };
        if !rows.is_empty() {
            debug!(after, entries = rows.len(), "Processing batch");
        }

        for row in rows {
            let outcome = self.process_entry(session, &row).await;
            self.stats.record(outcome);
            match outcome {
                EntryOutcome::Applied => summary.applied += 1,
                EntryOutcome::Failed(_) => summary.failed += 1,
            }
            self.advance(row.change_id).await?;
        }
        Ok(summary)
    }

    #[instrument(skip(self, session, row), fields(change_id = row.change_id, local_id = row.local_id))]
    async fn process_entry(&self, session: &mut LocalSession, row: &ChangeRow) -> EntryOutcome {
        let entry = match row.decode() {
            Ok(entry) => entry,
            Err(e) => {
                self.entry_failed(row, &row.change_type.to_string(), &e);
                return EntryOutcome::Failed(e.failure_kind());
            }
        };

        match self.push(session, &entry).await {
            Ok(()) => {
                debug!(change_type = %entry.change_type, "Change pushed");
                self.emit(DispatcherEvent::ChangeApplied {
                    change_id: entry.change_id,
                    change_type: entry.change_type.slug().to_string(),
                    local_id: entry.local_id,
                });
                EntryOutcome::Applied
            }
            Err(e) => {
                self.entry_failed(row, entry.change_type.slug(), &e);
                EntryOutcome::Failed(e.failure_kind())
            }
        }
    }

    /// Run the handler and record its outcome in the id mapping store.
    async fn push(&self, session: &mut LocalSession, entry: &ChangeLogEntry) -> Result<()> {
        let handler = self.handlers.handler_for(entry.change_type);
        let mut ctx = HandlerContext::new(
            entry.local_id,
            self.remote.as_ref(),
            session,
            self.ids.as_ref(),
        );

        if let Some(outcome) = handler.push(&mut ctx).await? {
            debug!(
                action = ?outcome.action,
                item_type = %outcome.item_type,
                remote_id = %outcome.remote_id,
                "Updating id mapping"
            );
            self.ids
                .apply(entry.local_id, &outcome)
                .await
                .map_err(|e| SyncError::Unexpected(format!("id mapping update failed: {e}")))?;
        }
        Ok(())
    }

    async fn current_checkpoint(&mut self) -> Result<i64> {
        if let Some(checkpoint) = self.cached_checkpoint {
            return Ok(checkpoint);
        }
        let checkpoint = self.checkpoint.load().await?;
        debug!(checkpoint, "Checkpoint loaded");
        self.cached_checkpoint = Some(checkpoint);
        Ok(checkpoint)
    }

    async fn advance(&mut self, change_id: i64) -> Result<()> {
        match self.checkpoint.store(change_id).await {
            Ok(()) => {
                self.cached_checkpoint = Some(change_id);
                Ok(())
            }
            Err(e) => {
                self.cached_checkpoint = None;
                Err(e)
            }
        }
    }

    fn entry_failed(&self, row: &ChangeRow, change_type: &str, error: &SyncError) {
        let kind = error.failure_kind();
        match kind {
            FailureKind::RemoteCallFailure | FailureKind::Unexpected => error!(
                change_id = row.change_id,
                change_type,
                local_id = row.local_id,
                kind = %kind,
                error = %error,
                "Change not pushed"
            ),
            FailureKind::UnmappedId | FailureKind::DatabaseLocked => warn!(
                change_id = row.change_id,
                change_type,
                local_id = row.local_id,
                kind = %kind,
                error = %error,
                "Change skipped"
            ),
            FailureKind::StaleLocal => info!(
                change_id = row.change_id,
                change_type,
                local_id = row.local_id,
                error = %error,
                "Change refers to a local row that has moved on; skipped"
            ),
        }

        self.emit(DispatcherEvent::ChangeFailed {
            change_id: row.change_id,
            change_type: change_type.to_string(),
            local_id: row.local_id,
            kind: kind.as_str().to_string(),
            message: error.to_string(),
        });
    }

    fn cycle_failed(&mut self, error: &SyncError) {
        self.stats.cycle_failures += 1;
        warn!(error = %error, "Poll cycle failed; checkpoint left at last durable value");
        self.emit(DispatcherEvent::CycleFailed {
            message: error.to_string(),
        });
    }

    fn emit(&self, event: DispatcherEvent) {
        if let Some(events) = &self.events {
            events.emit(CoreEvent::Dispatcher(event)).ok();
        }
    }
}

/// Control handle for a dispatcher running on a background task.
pub struct DispatcherHandle {
    cancel: CancellationToken,
    task: JoinHandle<DispatchStats>,
}

impl DispatcherHandle {
    /// Ask the loop to exit after its current batch.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the loop to exit and return its final counters.
    pub async fn join(self) -> Result<DispatchStats> {
        self.task
            .await
            .map_err(|e| SyncError::Unexpected(format!("dispatcher task failed: {e}")))
    }
}

/// Start `dispatcher` on a tokio task.
pub fn spawn_dispatcher(mut dispatcher: Dispatcher) -> DispatcherHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move { dispatcher.run(token).await });
    DispatcherHandle { cancel, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeType;
    use crate::id_map::SqliteIdMappingStore;
    use crate::profile::PlayerProfile;
    use crate::test_support::{library_at, MockRemote};
    use crate::trigger::Namespace;
    use async_trait::async_trait;
    use core_library::{LocalDatabaseConfig, SqlIdent};
    use mockall::mock;
    use std::time::Duration;
    use tempfile::TempDir;

    mock! {
        Checkpoints {}

        #[async_trait]
        impl CheckpointStore for Checkpoints {
            async fn load(&self) -> Result<i64>;
            async fn store(&self, change_id: i64) -> Result<()>;
        }
    }

    const CHANGES: &str = r#"
        CREATE TABLE mpsync_test_changes (
            change_id INTEGER PRIMARY KEY,
            change_type INTEGER NOT NULL,
            local_id INTEGER NOT NULL
        );
    "#;

    fn fast_config() -> SyncEngineConfig {
        SyncEngineConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_lock_retry(2, Duration::from_millis(1), Duration::from_millis(2))
    }

    async fn dispatcher(
        dir: &TempDir,
        seed: &str,
        remote: MockRemote,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> Dispatcher {
        let path = library_at(dir, &format!("{CHANGES}{seed}")).await;
        let profile = PlayerProfile::mediamonkey().unwrap();
        let table = Namespace::for_profile("test").unwrap().change_log_table().unwrap();
        Dispatcher::new(
            fast_config(),
            LocalDatabase::new(LocalDatabaseConfig::new(path)).unwrap(),
            ChangeLog::new(table),
            profile.handlers(),
            Arc::new(remote),
            Arc::new(SqliteIdMappingStore::in_memory().await.unwrap()),
            checkpoint,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_failed_checkpoint_write_aborts_cycle_and_rereads() {
        let dir = TempDir::new().unwrap();
        let mut checkpoints = MockCheckpoints::new();
        checkpoints.expect_load().times(2).returning(|| Ok(0));
        checkpoints
            .expect_store()
            .times(1)
            .returning(|_| Err(SyncError::Checkpoint("disk full".to_string())));

        let mut remote = MockRemote::new();
        remote
            .expect_create_playlist()
            .times(1)
            .returning(|_| Ok("pl-1".to_string()));

        let mut dispatcher = dispatcher(
            &dir,
            &format!(
                "INSERT INTO Playlists (IDPlaylist, PlaylistName) VALUES (1, 'A');
                 INSERT INTO mpsync_test_changes (change_type, local_id) VALUES ({0}, 1), ({0}, 1);",
                ChangeType::CreatePlaylist.ordinal()
            ),
            remote,
            Arc::new(checkpoints),
        )
        .await;

        let err = dispatcher.drain(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::Checkpoint(_)));
        assert_eq!(dispatcher.stats().cycle_failures, 1);
        assert_eq!(dispatcher.stats().applied, 1);

        // The cache was dropped, so the next read goes back to storage.
        assert_eq!(dispatcher.current_checkpoint().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_ordinal_is_skipped_as_unexpected() {
        let dir = TempDir::new().unwrap();
        let mut checkpoints = MockCheckpoints::new();
        checkpoints.expect_load().times(1).returning(|| Ok(0));
        checkpoints
            .expect_store()
            .withf(|id| *id == 1)
            .times(1)
            .returning(|_| Ok(()));

        let mut dispatcher = dispatcher(
            &dir,
            "INSERT INTO mpsync_test_changes (change_type, local_id) VALUES (99, 1);",
            MockRemote::new(),
            Arc::new(checkpoints),
        )
        .await;

        let report = dispatcher.drain(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.checkpoint, 1);
        assert_eq!(dispatcher.stats().unexpected, 1);
    }

    #[tokio::test]
    async fn test_cancelled_drain_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let mut checkpoints = MockCheckpoints::new();
        checkpoints.expect_load().returning(|| Ok(0));
        checkpoints.expect_store().never();

        let mut dispatcher = dispatcher(
            &dir,
            "INSERT INTO mpsync_test_changes (change_type, local_id) VALUES (0, 1);",
            MockRemote::new(),
            Arc::new(checkpoints),
        )
        .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = dispatcher.drain(&cancel).await.unwrap();
        assert_eq!(report.processed(), 0);
        assert_eq!(report.checkpoint, 0);
    }

    #[tokio::test]
    async fn test_spawned_dispatcher_stops_on_request() {
        let dir = TempDir::new().unwrap();
        let mut checkpoints = MockCheckpoints::new();
        checkpoints.expect_load().returning(|| Ok(0));

        let dispatcher = dispatcher(&dir, "", MockRemote::new(), Arc::new(checkpoints)).await;
        let events = EventBus::new(16);
        let mut rx = events.subscribe();

        let handle = spawn_dispatcher(dispatcher.with_events(events));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.is_running());

        handle.stop();
        let stats = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap()
            .unwrap();
        assert!(stats.cycles >= 1);
        assert_eq!(stats.failed(), 0);

        assert!(matches!(
            rx.recv().await.unwrap(),
            CoreEvent::Dispatcher(DispatcherEvent::Started { checkpoint: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_database_fails_cycle_without_store() {
        let dir = TempDir::new().unwrap();
        let mut checkpoints = MockCheckpoints::new();
        checkpoints.expect_load().returning(|| Ok(4));
        checkpoints.expect_store().never();

        let profile = PlayerProfile::mediamonkey().unwrap();
        let mut dispatcher = Dispatcher::new(
            fast_config(),
            LocalDatabase::new(LocalDatabaseConfig::new(dir.path().join("absent.db"))).unwrap(),
            ChangeLog::new(SqlIdent::new("mpsync_test_changes").unwrap()),
            profile.handlers(),
            Arc::new(MockRemote::new()),
            Arc::new(SqliteIdMappingStore::in_memory().await.unwrap()),
            Arc::new(checkpoints),
        )
        .unwrap();

        assert!(dispatcher.drain(&CancellationToken::new()).await.is_err());
        assert_eq!(dispatcher.stats().cycle_failures, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let profile = PlayerProfile::mediamonkey().unwrap();
        let result = Dispatcher::new(
            fast_config().with_batch_size(0),
            LocalDatabase::new(LocalDatabaseConfig::new(dir.path().join("library.db"))).unwrap(),
            ChangeLog::new(SqlIdent::new("mpsync_test_changes").unwrap()),
            profile.handlers(),
            Arc::new(MockRemote::new()),
            Arc::new(SqliteIdMappingStore::in_memory().await.unwrap()),
            Arc::new(MockCheckpoints::new()),
        );
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_stats_count_failures_by_kind() {
        let mut stats = DispatchStats::default();
        stats.record(EntryOutcome::Applied);
        stats.record(EntryOutcome::Failed(FailureKind::StaleLocal));
        stats.record(EntryOutcome::Failed(FailureKind::RemoteCallFailure));

        assert_eq!(stats.applied, 1);
        assert_eq!(stats.remote_call_failures, 1);
        assert_eq!(stats.failed(), 2);
    }
}
