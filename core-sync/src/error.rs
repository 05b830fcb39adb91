use crate::change::ItemType;
use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote call failed: {0}")]
    RemoteCallFailure(String),

    #[error("Local {item_type} {local_id} no longer matches: {reason}")]
    StaleLocal {
        item_type: ItemType,
        local_id: i64,
        reason: String,
    },

    #[error("No remote id mapped for local {item_type} {local_id}")]
    UnmappedId { item_type: ItemType, local_id: i64 },

    #[error("Local database locked: {0}")]
    DatabaseLocked(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl SyncError {
    pub fn stale(item_type: ItemType, local_id: i64, reason: impl Into<String>) -> Self {
        Self::StaleLocal {
            item_type,
            local_id,
            reason: reason.into(),
        }
    }

    /// Classify the error for per-entry failure handling.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SyncError::RemoteCallFailure(_) => FailureKind::RemoteCallFailure,
            SyncError::StaleLocal { .. } => FailureKind::StaleLocal,
            SyncError::UnmappedId { .. } => FailureKind::UnmappedId,
            SyncError::DatabaseLocked(_) => FailureKind::DatabaseLocked,
            SyncError::Database(_)
            | SyncError::Checkpoint(_)
            | SyncError::InvalidConfig(_)
            | SyncError::Unexpected(_) => FailureKind::Unexpected,
        }
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        SyncError::RemoteCallFailure(error.to_string())
    }
}

impl From<LibraryError> for SyncError {
    fn from(error: LibraryError) -> Self {
        match error {
            LibraryError::Locked { .. } => SyncError::DatabaseLocked(error.to_string()),
            LibraryError::InvalidIdentifier(_) | LibraryError::InvalidInput { .. } => {
                SyncError::InvalidConfig(error.to_string())
            }
            LibraryError::Database(_) => SyncError::Database(error.to_string()),
            LibraryError::InvalidData(_) => SyncError::Unexpected(error.to_string()),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(error: sqlx::Error) -> Self {
        if core_library::is_locked(&error) {
            SyncError::DatabaseLocked(error.to_string())
        } else {
            SyncError::Database(error.to_string())
        }
    }
}

/// The five outcomes a failed change can be classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RemoteCallFailure,
    StaleLocal,
    UnmappedId,
    DatabaseLocked,
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RemoteCallFailure => "remote_call_failure",
            FailureKind::StaleLocal => "stale_local",
            FailureKind::UnmappedId => "unmapped_id",
            FailureKind::DatabaseLocked => "database_locked",
            FailureKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
