//! Service façade for hosts and the command line.
//!
//! [`SyncService`] turns a configuration name into everything the engine
//! needs: the persisted [`ProfileConfig`], the player profile, the trigger
//! installer, the id mapping store and the checkpoint file. Hosts supply the
//! remote library; the service never talks to a remote on its own.
//!
//! The [`control`] module exposes a running dispatcher on a local TCP port
//! for `status` and `shutdown` requests.

pub mod control;
pub mod error;

pub use control::{query_status, send_command, ControlServer, DEFAULT_CONTROL_PORT};
pub use error::{CoreError, Result};

use bridge_desktop::{AppDirectories, ProfilePaths};
use bridge_traits::RemoteLibrary;
use core_library::LocalDatabase;
use core_runtime::config::{ProfileConfig, SyncEngineConfig};
use core_runtime::events::EventBus;
use core_sync::{
    spawn_dispatcher, ChangeLog, CheckpointStore, DispatchStats, Dispatcher, DispatcherHandle,
    FileCheckpointStore, Namespace, PlayerProfile, SqliteIdMappingStore, TriggerInstaller,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Setup, teardown and start of named configurations.
#[derive(Clone)]
pub struct SyncService {
    dirs: AppDirectories,
    engine: SyncEngineConfig,
    events: EventBus,
}

/// Everything resolved from a configuration name.
struct Resolved {
    paths: ProfilePaths,
    config: ProfileConfig,
    profile: PlayerProfile,
    installer: TriggerInstaller,
    database: LocalDatabase,
}

impl SyncService {
    /// # Errors
    ///
    /// `CoreError::Runtime` if `engine` does not validate.
    pub fn new(dirs: AppDirectories, engine: SyncEngineConfig) -> Result<Self> {
        engine.validate()?;
        Ok(Self {
            dirs,
            engine,
            events: EventBus::default(),
        })
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn directories(&self) -> &AppDirectories {
        &self.dirs
    }

    /// Create or overwrite configuration `name` and attach change capture to
    /// its database.
    ///
    /// The checkpoint file is created at 0 if missing, the id mappings are
    /// cleared and the triggers are reattached, keeping change ids above any
    /// checkpoint left by an earlier setup, even one followed by a teardown.
    #[instrument(skip(self, config), fields(player = %config.player))]
    pub async fn setup(&self, name: &str, config: ProfileConfig) -> Result<ProfilePaths> {
        let paths = self.dirs.ensure_profile(name).await?;
        config.save(&paths.config_file).await?;

        let checkpoint = FileCheckpointStore::new(&paths.checkpoint_file);
        checkpoint.initialize().await?;
        let floor = checkpoint.load().await?;

        let ids = SqliteIdMappingStore::open(&paths.id_database).await?;
        ids.reset().await?;
        ids.close().await;

        let resolved = self.resolve(name, paths, config)?;
        let mut session = resolved.database.open().await?;
        let attached = resolved.installer.reattach_above(&mut session, floor).await;
        session.close().await;

        if !attached {
            return Err(CoreError::TriggerInstall {
                name: name.to_string(),
                action: "attach",
            });
        }

        info!(
            database = %resolved.config.database_path.display(),
            change_log = %resolved.installer.change_log_table(),
            "Configuration set up"
        );
        Ok(resolved.paths)
    }

    /// Remove change capture from the database of configuration `name`.
    /// The configuration directory is left in place.
    #[instrument(skip(self))]
    pub async fn teardown(&self, name: &str) -> Result<()> {
        let resolved = self.load(name).await?;
        let mut session = resolved.database.open().await?;
        let detached = resolved.installer.detach(&mut session).await;
        session.close().await;

        if !detached {
            return Err(CoreError::TriggerInstall {
                name: name.to_string(),
                action: "detach",
            });
        }
        info!("Configuration torn down");
        Ok(())
    }

    /// Start dispatching configuration `name` to `remote` on a background task.
    #[instrument(skip(self, remote))]
    pub async fn start(&self, name: &str, remote: Arc<dyn RemoteLibrary>) -> Result<RunningSync> {
        let resolved = self.load(name).await?;

        let mut session = resolved.database.open().await?;
        let attached = resolved.installer.is_attached(&mut session).await;
        session.close().await;
        if !attached? {
            return Err(CoreError::InitializationFailed(format!(
                "change capture for {name:?} is not attached; run setup first"
            )));
        }

        let ids = SqliteIdMappingStore::open(&resolved.paths.id_database).await?;
        let checkpoint = FileCheckpointStore::new(&resolved.paths.checkpoint_file);

        let dispatcher = Dispatcher::new(
            self.engine.clone(),
            resolved.database,
            ChangeLog::new(resolved.installer.change_log_table().clone()),
            resolved.profile.handlers(),
            remote,
            Arc::new(ids),
            Arc::new(checkpoint),
        )?
        .with_events(self.events.clone());

        info!(
            poll_interval = ?self.engine.poll_interval,
            batch_size = self.engine.batch_size,
            "Starting dispatcher"
        );
        Ok(RunningSync {
            name: name.to_string(),
            handle: spawn_dispatcher(dispatcher),
        })
    }

    async fn load(&self, name: &str) -> Result<Resolved> {
        let paths = self.dirs.profile(name)?;
        if !paths.exists().await? {
            return Err(CoreError::ProfileNotFound(name.to_string()));
        }
        let config = ProfileConfig::load(&paths.config_file).await?;
        self.resolve(name, paths, config)
    }

    fn resolve(&self, name: &str, paths: ProfilePaths, config: ProfileConfig) -> Result<Resolved> {
        let profile = PlayerProfile::from_kind(config.player)?;
        let installer = profile.installer(Namespace::for_profile(name)?)?;
        let database =
            LocalDatabase::new(profile.database_config(&config.database_path, &self.engine))?;

        Ok(Resolved {
            paths,
            config,
            profile,
            installer,
            database,
        })
    }
}

/// A configuration whose dispatcher is running.
pub struct RunningSync {
    name: String,
    handle: DispatcherHandle,
}

impl RunningSync {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the dispatcher to exit after its current batch.
    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Token a control surface can cancel to stop the dispatcher.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.handle.cancellation_token()
    }

    /// Wait for the dispatcher to exit.
    pub async fn join(self) -> Result<DispatchStats> {
        Ok(self.handle.join().await?)
    }
}
