//! # Host Bridge Traits
//!
//! Seams between the sync engine and the environment it runs in.
//!
//! ## Overview
//!
//! The engine needs two capabilities it cannot provide itself:
//!
//! - [`RemoteLibrary`](remote::RemoteLibrary) - a pre-authenticated handle to the
//!   remote music service that receives pushed changes
//! - [`LoggerSink`](log::LoggerSink) - an optional host log pipeline that mirrors
//!   the engine's structured logs
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should report remote rejections as [`BridgeError::RemoteCall`] with the
//! operation name so the dispatcher can log the divergence precisely.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so that a single handle can be
//! shared with the background dispatcher task.

pub mod error;
pub mod log;
pub mod remote;

pub use error::BridgeError;
pub use remote::{RemoteId, RemoteLibrary, SongMetadata};
