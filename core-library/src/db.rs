//! # Database Connection Module
//!
//! Connections to the media player's database and to the engine's own
//! SQLite files.
//!
//! ## Local database
//!
//! The media player keeps its database open and may lock it for long
//! periods. [`LocalDatabase::open`] hands out a [`LocalSession`] wrapping a
//! single fresh connection; the dispatcher opens one per poll cycle and
//! closes it at the end of the cycle. Every statement issued through
//! [`LocalSession::retrying`] is retried with exponential backoff while the
//! database reports itself locked, up to [`LockRetryPolicy::max_attempts`].
//!
//! Journal mode and other persistent pragmas of the local database are
//! never changed.
//!
//! ## Engine databases
//!
//! [`create_pool`] builds a WAL-mode pool for databases the engine owns
//! outright, such as the id mapping store.
//!
//! ```rust,ignore
//! use core_library::db::{LocalDatabase, LocalDatabaseConfig};
//!
//! let database = LocalDatabase::new(LocalDatabaseConfig::new("/music/MM.DB"))?;
//! let mut session = database.open().await?;
//! session.execute("SELECT 1").await?;
//! session.close().await;
//! ```

use crate::{LibraryError, Result};
use futures::future::BoxFuture;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// SQLITE_BUSY
const SQLITE_BUSY: i32 = 5;
/// SQLITE_LOCKED
const SQLITE_LOCKED: i32 = 6;

/// Whether an error means "another connection holds a lock, try again later".
///
/// Matches the primary result codes `SQLITE_BUSY` and `SQLITE_LOCKED`
/// (extended codes are masked) and, for drivers that only surface the
/// message, the text `database is locked`.
pub fn is_locked(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => {
            let primary = db_error
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);

            matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
                || db_error.message().contains("database is locked")
                || db_error.message().contains("database table is locked")
        }
        _ => false,
    }
}

// ============================================================================
// Lock Retry Policy
// ============================================================================

/// Bounded retry-with-backoff applied while the local database is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl LockRetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

// ============================================================================
// Local Database
// ============================================================================

/// Connection settings for the media player's database.
#[derive(Debug, Clone)]
pub struct LocalDatabaseConfig {
    pub path: PathBuf,
    /// SQLite busy handler timeout per statement
    pub busy_timeout: Duration,
    pub retry: LockRetryPolicy,
    /// Collations the player's schema declares, registered as
    /// case-insensitive comparisons so that its indexes stay usable
    pub case_insensitive_collations: Vec<String>,
}

impl LocalDatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
            retry: LockRetryPolicy::default(),
            case_insensitive_collations: Vec::new(),
        }
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: LockRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn collation(mut self, name: impl Into<String>) -> Self {
        self.case_insensitive_collations.push(name.into());
        self
    }
}

/// Factory for per-cycle sessions on the media player's database.
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    options: SqliteConnectOptions,
    retry: LockRetryPolicy,
    path: PathBuf,
}

impl LocalDatabase {
    /// # Errors
    ///
    /// Returns `LibraryError::InvalidInput` if the path is empty.
    pub fn new(config: LocalDatabaseConfig) -> Result<Self> {
        if config.path.as_os_str().is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "path".to_string(),
                message: "local database path cannot be empty".to_string(),
            });
        }

        let mut options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(false)
            .busy_timeout(config.busy_timeout);

        for name in &config.case_insensitive_collations {
            options = options.collation(name.as_str(), |a: &str, b: &str| {
                a.to_lowercase().cmp(&b.to_lowercase())
            });
        }

        Ok(Self {
            options,
            retry: config.retry,
            path: config.path,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Open a fresh connection.
    ///
    /// # Errors
    ///
    /// `LibraryError::Locked` if the database stayed locked for every attempt,
    /// `LibraryError::Database` for anything else (missing file, corruption).
    pub async fn open(&self) -> Result<LocalSession> {
        let mut attempt = 0;
        loop {
            match SqliteConnection::connect_with(&self.options).await {
                Ok(conn) => {
                    debug!(path = ?self.path, "Opened local database session");
                    return Ok(LocalSession {
                        conn,
                        retry: self.retry,
                    });
                }
                Err(e) if is_locked(&e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(LibraryError::Locked {
                            operation: "open".to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.retry.backoff(attempt - 1);
                    warn!(attempt, ?delay, "Local database locked while opening; backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(LibraryError::Database(e)),
            }
        }
    }
}

/// One connection to the local database, alive for a single poll cycle.
pub struct LocalSession {
    conn: SqliteConnection,
    retry: LockRetryPolicy,
}

impl LocalSession {
    /// Run `op` against the connection, retrying while the database is locked.
    ///
    /// `op` is re-invoked from scratch on every attempt, so it must own
    /// whatever it binds (clone SQL strings into the future).
    ///
    /// # Errors
    ///
    /// `LibraryError::Locked` once `max_attempts` attempts all hit a lock;
    /// any other database error is returned immediately.
    pub async fn retrying<T, F>(&mut self, operation: &str, mut op: F) -> Result<T>
    where
        F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, std::result::Result<T, sqlx::Error>>
            + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match op(&mut self.conn).await {
                Ok(value) => return Ok(value),
                Err(e) if is_locked(&e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        warn!(operation, attempts = attempt, "Local database still locked; giving up");
                        return Err(LibraryError::Locked {
                            operation: operation.to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.retry.backoff(attempt - 1);
                    debug!(operation, attempt, ?delay, "Local database locked; backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(LibraryError::Database(e)),
            }
        }
    }

    /// Execute a statement without bound parameters, with lock retry.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        let sql = sql.to_string();
        self.retrying("execute", move |conn| {
            let sql = sql.clone();
            Box::pin(async move {
                sqlx::query(&sql)
                    .execute(conn)
                    .await
                    .map(|done| done.rows_affected())
            })
        })
        .await
    }

    pub async fn close(self) {
        if let Err(e) = self.conn.close().await {
            debug!(error = %e, "Error while closing local database session");
        }
    }
}

// ============================================================================
// Engine-owned databases
// ============================================================================

/// Pool configuration for a database owned by the engine.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL, `sqlite:<path>` or `sqlite::memory:`
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        Self {
            database_url: format!("sqlite:{}", path.display()),
            max_connections: 2,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// A private in-memory database. Limited to one connection, since every
    /// connection to `:memory:` would otherwise see its own empty database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Create a WAL-mode SQLite pool and verify it answers queries.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Creating database connection pool"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .create_if_missing(true);

    let in_memory = config.database_url.contains(":memory:");
    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout);
    if in_memory {
        pool_options = pool_options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            LibraryError::Database(e)
        })?;

    health_check(&pool).await?;
    Ok(pool)
}

async fn health_check(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        LibraryError::Database(e)
    })?;
    debug!("Database health check passed");
    Ok(())
}
