//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge seams for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - [`AppDirectories`] / [`ProfilePaths`] - per-configuration persisted layout
//!   under the platform data directory (`dirs`)
//! - [`DryRunRemoteLibrary`] - a `RemoteLibrary` that only logs the calls it
//!   receives and fabricates remote ids, for trying a configuration without
//!   touching a real account
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{AppDirectories, DryRunRemoteLibrary};
//!
//! let dirs = AppDirectories::new();
//! let paths = dirs.profile("home")?;
//! let remote = DryRunRemoteLibrary::new();
//! ```

mod dry_run;
mod filesystem;

pub use dry_run::DryRunRemoteLibrary;
pub use filesystem::{AppDirectories, ProfilePaths, HOME_ENV_VAR};
