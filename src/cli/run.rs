use super::config::{default_config_path, default_database_path, LoggingConfig, SentinelConfig};
use sentinel::clock::SystemClock;
use sentinel::coordinator::{RunStatus, Sentinel};
use sentinel::daemon::JsonRpcDaemon;
use sentinel::store::ObjectStore;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Nothing to do, or a full run.
pub const EXIT_OK: i32 = 0;
/// Hard failure or interrupted by a signal.
pub const EXIT_FAILURE: i32 = 1;
/// Another run holds the lock.
pub const EXIT_ALREADY_RUNNING: i32 = 2;

/// Run the sentinel once
///
/// ## Configuration Loading
///
/// 1. `--config` flag if provided
/// 2. Default config at `~/.local/share/sentinel/sentinel.toml`
///
/// If the config file doesn't exist, a default one is generated.
pub async fn execute(
    config_path: Option<String>,
    bypass_scheduler: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    let config = if config_path.exists() {
        SentinelConfig::load(&config_path)?
    } else {
        SentinelConfig::create_default(&config_path, &default_database_path())?;
        eprintln!("Created default configuration: {}", config_path.display());
        SentinelConfig::load(&config_path)?
    };

    init_logging(&config.logging)?;
    info!(
        config = %config_path.display(),
        database = %config.database.path.display(),
        network = %config.network.name,
        "starting sentinel"
    );

    let daemon = JsonRpcDaemon::connect(&config.credentials()?)?;
    let store = ObjectStore::open(&config.database.path).await?;
    let sentinel = Sentinel::new(
        daemon,
        store,
        Arc::new(SystemClock),
        config.network_params(),
        config.run_options(bypass_scheduler),
    );

    let status = tokio::select! {
        result = sentinel.run_once() => match result {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "sentinel run failed");
                return Ok(EXIT_FAILURE);
            }
        },
        name = shutdown_signal() => {
            warn!(signal = name, "got a signal, cleaning up");
            sentinel.release_lock().await?;
            return Ok(EXIT_FAILURE);
        }
    };

    info!(?status, "sentinel run finished");
    Ok(exit_code(&status))
}

fn exit_code(status: &RunStatus) -> i32 {
    match status {
        RunStatus::AlreadyRunning => EXIT_ALREADY_RUNNING,
        RunStatus::Aborted { .. } => EXIT_FAILURE,
        _ => EXIT_OK,
    }
}

/// `RUST_LOG` wins; otherwise `SENTINEL_DEBUG` forces debug, else the
/// configured level.
fn log_level(logging: &LoggingConfig, sentinel_debug: bool) -> String {
    if sentinel_debug {
        "debug".to_string()
    } else {
        logging.level.clone()
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let level = log_level(logging, std::env::var_os("SENTINEL_DEBUG").is_some());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Resolves with the signal name on SIGINT or SIGTERM.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}
