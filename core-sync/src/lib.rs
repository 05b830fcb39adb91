//! # Change Capture & Dispatch
//!
//! Captures mutations of a media player's SQLite library with triggers and
//! pushes them, in commit order, to a remote music library.
//!
//! ## Overview
//!
//! - **Trigger installer** (`trigger`): creates the namespaced change log
//!   table and one trigger per watched change type; attach, detach and
//!   reattach are all-or-nothing
//! - **Change log** (`change_log`): reads entries above the checkpoint in
//!   ascending `change_id` order
//! - **Handlers** (`handler`, `handlers`): one per change type, selected by an
//!   exhaustive match; create/delete handlers report a `HandlerOutcome`
//! - **Id mapping store** (`id_map`): local id to remote id, per item type
//! - **Checkpoint store** (`checkpoint`): the last processed `change_id`,
//!   replaced atomically on disk
//! - **Dispatcher** (`dispatcher`): the poll loop tying them together
//! - **Player profiles** (`profile`): schema, triggers and metadata mapping
//!   of a supported media player
//!
//! ## Failure handling
//!
//! Every entry ends in exactly one of: applied, remote call failure, stale
//! local row, unmapped id, database locked, unexpected. The checkpoint
//! advances past the entry in every case; see [`FailureKind`].

pub mod change;
pub mod change_log;
pub mod checkpoint;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod id_map;
pub mod metadata;
pub mod profile;
pub mod trigger;

#[cfg(test)]
pub(crate) mod test_support;

pub use change::{ChangeLogEntry, ChangeType, HandlerAction, HandlerOutcome, ItemType};
pub use change_log::{ChangeLog, ChangeRow, WATERMARK_ORDINAL};
pub use checkpoint::{CheckpointStore, FileCheckpointStore};
pub use dispatcher::{spawn_dispatcher, DispatchStats, Dispatcher, DispatcherHandle, DrainReport};
pub use error::{FailureKind, Result, SyncError};
pub use handler::{ChangeHandler, HandlerContext, HandlerSet};
pub use id_map::{IdMappingStore, SqliteIdMappingStore};
pub use metadata::{MetadataMapping, ValueTransform};
pub use profile::PlayerProfile;
pub use trigger::{Namespace, RowRef, TriggerEvent, TriggerInstaller, WatchedChange};
