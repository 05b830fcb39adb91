use anyhow::{bail, Context, Result};
use bridge_desktop::{AppDirectories, DryRunRemoteLibrary};
use bridge_traits::log::LogLevel;
use clap::{Parser, Subcommand};
use core_runtime::config::{PlayerKind, ProfileConfig, SyncEngineConfig};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::{query_status, send_command, ControlServer, SyncService, DEFAULT_CONTROL_PORT};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mpsync")]
#[command(version)]
#[command(about = "Push media player library changes to a remote music library", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a configuration and attach change capture to its database
    Setup {
        /// Configuration name
        name: String,
        /// Media player owning the database (mediamonkey)
        player: PlayerKind,
        /// Path to the media player's SQLite database
        db_path: PathBuf,
    },

    /// Remove change capture from a configuration's database
    Teardown {
        /// Configuration name
        name: String,
    },

    /// Dispatch changes until stopped
    Run {
        /// Configuration name
        name: String,
        /// Control channel port
        #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
        port: u16,
        /// pretty, json or compact
        #[arg(long, default_value = "compact")]
        log_format: LogFormat,
    },

    /// Ask a running dispatcher to stop
    Stop {
        #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
        port: u16,
    },

    /// Report whether a dispatcher is running
    Status {
        #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    match cli.command {
        Commands::Setup {
            name,
            player,
            db_path,
        } => {
            init(LogFormat::Compact, level)?;
            let db_path = tokio::fs::canonicalize(&db_path)
                .await
                .with_context(|| format!("database not found at {}", db_path.display()))?;

            let paths = service()?
                .setup(&name, ProfileConfig::new(player, db_path))
                .await
                .with_context(|| format!("setup of {name:?} failed"))?;
            println!("Configuration {name:?} ready in {}", paths.dir.display());
        }
        Commands::Teardown { name } => {
            init(LogFormat::Compact, level)?;
            service()?
                .teardown(&name)
                .await
                .with_context(|| format!("teardown of {name:?} failed"))?;
            println!("Change capture removed for {name:?}");
        }
        Commands::Run {
            name,
            port,
            log_format,
        } => {
            init(log_format, level)?;
            serve(&name, port).await?;
        }
        Commands::Stop { port } => {
            if !query_status(port).await? {
                bail!("no dispatcher is answering on port {port}");
            }
            let reply = send_command(port, "shutdown").await?;
            println!("{reply}");
        }
        Commands::Status { port } => {
            if query_status(port).await? {
                println!("running");
            } else {
                println!("not running");
            }
        }
    }
    Ok(())
}

fn init(format: LogFormat, level: LogLevel) -> Result<()> {
    init_logging(LoggingConfig::default().with_format(format).with_level(level))
        .context("failed to initialise logging")
}

fn service() -> Result<SyncService> {
    Ok(SyncService::new(
        AppDirectories::new(),
        SyncEngineConfig::default(),
    )?)
}

async fn serve(name: &str, port: u16) -> Result<()> {
    if query_status(port).await? {
        bail!("a dispatcher is already running on port {port}");
    }

    // Remote clients are supplied by embedding hosts; the CLI only logs.
    let remote = Arc::new(DryRunRemoteLibrary::new());
    let running = service()?
        .start(name, remote)
        .await
        .with_context(|| format!("cannot start {name:?}"))?;

    let token = running.cancellation_token();
    let server = ControlServer::bind(port, token.clone()).await?;
    let server = tokio::spawn(server.serve());

    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; stopping after the current batch");
            interrupt.cancel();
        }
    });

    let stats = running.join().await?;
    match server.await {
        Ok(Err(e)) => warn!(error = %e, "Control channel ended with an error"),
        Err(e) => warn!(error = %e, "Control channel task failed"),
        Ok(Ok(())) => {}
    }

    info!(
        applied = stats.applied,
        failed = stats.failed(),
        cycle_failures = stats.cycle_failures,
        "Dispatcher exited"
    );
    Ok(())
}
