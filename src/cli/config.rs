//! Sentinel configuration file handling
//!
//! Configuration is TOML, stored by default at
//! `~/.local/share/sentinel/sentinel.toml` and generated with comments on
//! first run. Every section is optional; missing values take the defaults
//! below. RPC credentials left empty are filled from syscoind's own
//! `syscoin.conf`.

use sentinel::coordinator::RunOptions;
use sentinel::daemon::{NetworkParams, RpcCredentials};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

const MAINNET_RPC_PORT: u16 = 8370;
const TESTNET_RPC_PORT: u16 = 18370;

/// Sentinel operator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub voting: VotingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// syscoind RPC connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Defaults to 8370 on mainnet, 18370 otherwise
    pub port: Option<u16>,

    #[serde(default)]
    pub rpc_user: String,

    #[serde(default)]
    pub rpc_password: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// syscoind config read for rpcuser/rpcpassword/rpcport when the values
    /// above are unset. Defaults to `~/.syscoin/syscoin.conf`
    pub syscoin_conf: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// "mainnet" or "testnet"
    #[serde(default = "default_network")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between full runs
    #[serde(default = "default_interval_secs")]
    pub interval_secs: i64,

    /// Upper bound of the random pre-run delay (capped at 60)
    #[serde(default = "default_max_jitter_secs")]
    pub max_jitter_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Cast `valid` votes on every synced object
    #[serde(default)]
    pub validity_votes: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_network() -> String {
    "mainnet".to_string()
}

fn default_interval_secs() -> i64 {
    RunOptions::default().interval_secs
}

fn default_max_jitter_secs() -> u64 {
    RunOptions::default().max_jitter_secs
}

fn default_lock_ttl_secs() -> i64 {
    RunOptions::default().lock_ttl_secs
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            rpc_user: String::new(),
            rpc_password: String::new(),
            timeout_secs: default_timeout_secs(),
            syscoin_conf: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: default_network(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_jitter_secs: default_max_jitter_secs(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lock_ttl_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl SentinelConfig {
    /// Create a new configuration with the given database path
    #[cfg(test)]
    pub fn new(database_path: PathBuf) -> Self {
        Self {
            database: DatabaseConfig {
                path: database_path,
            },
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: SentinelConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    #[cfg(test)]
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    pub fn is_mainnet(&self) -> bool {
        self.network.name == "mainnet"
    }

    fn network_rpc_port(&self) -> u16 {
        if self.is_mainnet() {
            MAINNET_RPC_PORT
        } else {
            TESTNET_RPC_PORT
        }
    }

    pub fn rpc_port(&self) -> u16 {
        self.daemon.port.unwrap_or_else(|| self.network_rpc_port())
    }

    /// `[main]` or `[test]`, the syscoin.conf section for this network.
    fn conf_section(&self) -> &'static str {
        if self.is_mainnet() {
            "main"
        } else {
            "test"
        }
    }

    /// RPC connection settings. Values set here win; anything missing comes
    /// from syscoin.conf, then from the network defaults.
    pub fn credentials(&self) -> Result<RpcCredentials, Box<dyn std::error::Error>> {
        let daemon = &self.daemon;
        let complete =
            !daemon.rpc_user.is_empty() && !daemon.rpc_password.is_empty() && daemon.port.is_some();
        let conf = if complete {
            SyscoinConf::default()
        } else {
            let path = daemon
                .syscoin_conf
                .clone()
                .unwrap_or_else(default_syscoin_conf_path);
            SyscoinConf::load(&path, self.conf_section())?.unwrap_or_default()
        };

        let or_conf = |value: &str, fallback: Option<String>| {
            if value.is_empty() {
                fallback.unwrap_or_default()
            } else {
                value.to_string()
            }
        };

        Ok(RpcCredentials {
            host: daemon.host.clone(),
            port: daemon
                .port
                .or(conf.rpc_port)
                .unwrap_or_else(|| self.network_rpc_port()),
            user: or_conf(&daemon.rpc_user, conf.rpc_user),
            password: or_conf(&daemon.rpc_password, conf.rpc_password),
            timeout: Duration::from_secs(daemon.timeout_secs),
        })
    }

    pub fn network_params(&self) -> NetworkParams {
        NetworkParams::for_network(&self.network.name)
    }

    pub fn run_options(&self, bypass_scheduler: bool) -> RunOptions {
        RunOptions {
            bypass_scheduler,
            validity_votes: self.voting.validity_votes,
            lock_ttl_secs: self.lock.ttl_secs,
            interval_secs: self.schedule.interval_secs,
            max_jitter_secs: self.schedule.max_jitter_secs,
        }
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(database_path: &Path) -> String {
        format!(
            r#"# Syscoin Sentinel Configuration
#
# Sentinel is started periodically (e.g. every minute from cron). Each start
# checks the schedule below and exits early unless a run is due.

[daemon]
# syscoind JSON-RPC endpoint and credentials. Empty credentials and an unset
# port are read from syscoin.conf (rpcuser, rpcpassword, rpcport)
host = "127.0.0.1"
# port defaults to rpcport, else 8370 on mainnet and 18370 on testnet
# port = 8370
rpc_user = ""
rpc_password = ""
timeout_secs = 30
# syscoin_conf = "/home/syscoin/.syscoin/syscoin.conf"

[network]
# "mainnet" or "testnet"
name = "mainnet"

[database]
# Local sqlite database (synced objects, cast votes, run lock, schedule)
path = "{database_path}"

[schedule]
# Seconds between full sync/vote runs
interval_secs = 600
# Random delay before each scheduled run, in seconds (max 60)
max_jitter_secs = 60

[lock]
# A crashed run blocks new runs for at most this long
ttl_secs = 90

[voting]
# Vote valid/invalid on every synced proposal and superblock
validity_votes = false

[logging]
# Log level: trace, debug, info, warn, error
# RUST_LOG overrides this; SENTINEL_DEBUG=1 forces debug
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/sentinel/sentinel.log"
"#,
            database_path = database_path.display()
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        database_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(database_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// RPC settings from syscoind's `syscoin.conf`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyscoinConf {
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub rpc_port: Option<u16>,
}

impl SyscoinConf {
    /// Parse `key=value` lines. Keys before any section header apply to
    /// every network; keys under `[section]` only to that network and win.
    pub fn parse(contents: &str, section: &str) -> Self {
        let mut global = Self::default();
        let mut scoped = Self::default();
        let mut current: Option<&str> = None;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(name.trim());
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let target = match current {
                None => &mut global,
                Some(name) if name == section => &mut scoped,
                Some(_) => continue,
            };
            let value = value.trim().to_string();
            match key.trim() {
                "rpcuser" => target.rpc_user = Some(value),
                "rpcpassword" => target.rpc_password = Some(value),
                "rpcport" => target.rpc_port = value.parse().ok(),
                _ => {}
            }
        }

        Self {
            rpc_user: scoped.rpc_user.or(global.rpc_user),
            rpc_password: scoped.rpc_password.or(global.rpc_password),
            rpc_port: scoped.rpc_port.or(global.rpc_port),
        }
    }

    /// `Ok(None)` when the file does not exist.
    pub fn load(path: &Path, section: &str) -> Result<Option<Self>, Box<dyn std::error::Error>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(Self::parse(&contents, section))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(format!("Failed to read syscoin.conf '{}': {}", path.display(), e).into()),
        }
    }
}

/// `~/.syscoin/syscoin.conf`
pub fn default_syscoin_conf_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".syscoin")
        .join("syscoin.conf")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sentinel")
}

/// `~/.local/share/sentinel/sentinel.toml` on Linux
pub fn default_config_path() -> PathBuf {
    data_dir().join("sentinel.toml")
}

/// `~/.local/share/sentinel/sentinel.db` on Linux
pub fn default_database_path() -> PathBuf {
    data_dir().join("sentinel.db")
}
