//! Per-configuration directory layout

use bridge_traits::error::{BridgeError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Environment variable overriding the data root.
pub const HOME_ENV_VAR: &str = "MPSYNC_HOME";

const APP_DIR_NAME: &str = "mpsync";

/// Root of everything the engine persists outside the source database.
#[derive(Debug, Clone)]
pub struct AppDirectories {
    root: PathBuf,
}

impl AppDirectories {
    /// Resolve the data root: `$MPSYNC_HOME` if set, otherwise the platform
    /// data directory joined with `mpsync`.
    pub fn new() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV_VAR) {
            return Self::with_root(PathBuf::from(home));
        }

        let root = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join(APP_DIR_NAME);

        Self { root }
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths for a named configuration. The directory is not created.
    pub fn profile(&self, name: &str) -> Result<ProfilePaths> {
        validate_profile_name(name)?;
        Ok(ProfilePaths::new(self.root.join(name)))
    }

    /// Paths for a named configuration, creating its directory if needed.
    pub async fn ensure_profile(&self, name: &str) -> Result<ProfilePaths> {
        let paths = self.profile(name)?;
        if !fs::try_exists(&paths.dir).await? {
            fs::create_dir_all(&paths.dir).await?;
            debug!(path = ?paths.dir, "Created configuration directory");
        }
        Ok(paths)
    }
}

impl Default for AppDirectories {
    fn default() -> Self {
        Self::new()
    }
}

/// Files belonging to a single named configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePaths {
    pub dir: PathBuf,
    /// Persisted configuration document
    pub config_file: PathBuf,
    /// Last processed change id
    pub checkpoint_file: PathBuf,
    /// Local to remote id mappings
    pub id_database: PathBuf,
}

impl ProfilePaths {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            config_file: dir.join("config.json"),
            checkpoint_file: dir.join("last_change"),
            id_database: dir.join("ids.db"),
            dir,
        }
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(fs::try_exists(&self.config_file).await?)
    }
}

fn validate_profile_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '));

    if valid {
        Ok(())
    } else {
        Err(BridgeError::OperationFailed(format!(
            "invalid configuration name: {name:?}"
        )))
    }
}
