//! Server configuration: the settings a deployer can override in the
//! JSON config file passed to every CLI subcommand.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Vault root path.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// `host:port` to bind the HTTP server to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Seconds between automatic history snapshots.
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,

    /// Drained-spool size above which a reconnecting subscriber is
    /// told to full-sync instead of replaying individual events.
    #[serde(default = "default_resync_threshold")]
    pub resync_threshold: usize,

    /// Seconds between keep-alive comment frames on an idle event
    /// stream.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// CORS allow-origin value for the editor's app origin.
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_snapshot_interval_secs() -> u64 {
    6 * 60 * 60
}

fn default_resync_threshold() -> usize {
    10
}

fn default_heartbeat_interval_secs() -> u64 {
    120
}

fn default_allowed_origin() -> String {
    "app://obsidian.md".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            listen_address: default_listen_address(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
            resync_threshold: default_resync_threshold(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

impl Config {
    pub fn load(path: &std::path::Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("failed to read config: {}", e)))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.listen_address.is_empty() {
            return Err(CliError::config_error("listen_address must not be empty"));
        }
        if self.snapshot_interval_secs == 0 {
            return Err(CliError::config_error("snapshot_interval_secs must be > 0"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(CliError::config_error("heartbeat_interval_secs must be > 0"));
        }
        Ok(())
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
