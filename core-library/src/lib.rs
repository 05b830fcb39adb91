//! # Local Library Access
//!
//! Read access to a media player's SQLite database, plus the connection
//! handling the sync engine needs around it.
//!
//! ## Overview
//!
//! The database is owned by another application, which may hold locks on it
//! for long stretches. This crate therefore:
//! - opens a fresh [`LocalSession`](db::LocalSession) per poll cycle instead of
//!   keeping a pool open on someone else's file
//! - classifies "database is locked" errors and retries them with bounded
//!   exponential backoff ([`LockRetryPolicy`](db::LockRetryPolicy))
//! - only ever interpolates table and column names that passed the
//!   [`SqlIdent`](ident::SqlIdent) allow-list
//!
//! Row reads for songs and playlists live in [`repositories`]. The engine's own
//! databases (id mappings) use [`create_pool`](db::create_pool).

pub mod db;
pub mod error;
pub mod ident;
pub mod repositories;
pub mod schema;

pub use db::{is_locked, LocalDatabase, LocalDatabaseConfig, LocalSession, LockRetryPolicy};
pub use error::{LibraryError, Result};
pub use ident::SqlIdent;
pub use schema::LibrarySchema;
