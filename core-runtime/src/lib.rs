//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the sync engine crates:
//! - Logging and tracing initialisation
//! - Engine and per-configuration settings
//! - Event bus for dispatcher notifications
//!
//! ## Overview
//!
//! Nothing in here knows about change logs or handlers. It establishes the
//! logging conventions, the immutable configuration values handed to the
//! dispatcher at startup, and the broadcast channel observers subscribe to.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
