//! # Configuration Module
//!
//! Immutable configuration values for the sync engine.
//!
//! ## Overview
//!
//! Two kinds of configuration exist:
//!
//! - [`SyncEngineConfig`] - tuning of the poll loop (batch size, poll interval,
//!   lock retry policy). Built once at startup with the `with_*` builder,
//!   checked with [`SyncEngineConfig::validate`], then passed into the
//!   dispatcher. There is no process-wide configuration state.
//! - [`ProfileConfig`] - the persisted document of a named configuration:
//!   which media player owns the local database and where that database lives.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SyncEngineConfig;
//! use std::time::Duration;
//!
//! let config = SyncEngineConfig::default()
//!     .with_batch_size(25)
//!     .with_poll_interval(Duration::from_secs(2));
//! config.validate()?;
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default number of change log entries read per batch.
pub const DEFAULT_BATCH_SIZE: u32 = 10;

/// Default sleep between polls of an empty change log.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

// ============================================================================
// Engine Configuration
// ============================================================================

/// Poll loop tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEngineConfig {
    /// Sleep once the change log backlog is empty
    pub poll_interval: Duration,
    /// Maximum entries read per batch
    pub batch_size: u32,
    /// Attempts made while the local database reports itself locked
    pub lock_retry_attempts: u32,
    /// First backoff delay; doubles per attempt
    pub lock_retry_base_delay: Duration,
    /// Backoff ceiling
    pub lock_retry_max_delay: Duration,
    /// SQLite busy handler timeout applied to every local connection
    pub busy_timeout: Duration,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            lock_retry_attempts: 5,
            lock_retry_base_delay: Duration::from_millis(500),
            lock_retry_max_delay: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl SyncEngineConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_lock_retry(mut self, attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        self.lock_retry_attempts = attempts;
        self.lock_retry_base_delay = base_delay;
        self.lock_retry_max_delay = max_delay;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a value would stall or spin the poll loop.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(Error::Config(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.lock_retry_attempts == 0 {
            return Err(Error::Config(
                "Lock retry attempts must be at least 1".to_string(),
            ));
        }

        if self.lock_retry_max_delay < self.lock_retry_base_delay {
            return Err(Error::Config(
                "Lock retry max delay must not be shorter than the base delay".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Persisted Profile Configuration
// ============================================================================

/// Media player whose database is being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
    MediaMonkey,
}

impl PlayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerKind::MediaMonkey => "mediamonkey",
        }
    }
}

impl fmt::Display for PlayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mediamonkey" | "mm" => Ok(PlayerKind::MediaMonkey),
            other => Err(Error::Config(format!("Unsupported media player: {other}"))),
        }
    }
}

/// Document stored as `config.json` in a configuration's directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub player: PlayerKind,
    /// Path to the media player's SQLite database
    pub database_path: PathBuf,
}

impl ProfileConfig {
    pub fn new(player: PlayerKind, database_path: impl Into<PathBuf>) -> Self {
        Self {
            player,
            database_path: database_path.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!("No configuration found at {}", path.display()))
            } else {
                Error::Io(e)
            }
        })?;
        let config: Self = serde_json::from_slice(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let raw = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, raw).await?;
        Ok(())
    }
}
