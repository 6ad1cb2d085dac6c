//! CLI command implementations.

use std::path::Path;
use std::sync::Arc;

use crate::broadcast::Broadcaster;
use crate::history::HistoryStore;
use crate::observability::Logger;
use crate::registry::ClientRegistry;
use crate::spool::Spool;
use crate::sync::SyncEngine;
use crate::vault::VaultStore;

use super::args::Command;
use super::config::Config;
use super::errors::{CliError, CliResult};

/// Main CLI entry point. Parses arguments and dispatches to the
/// appropriate command; this is the only function main.rs calls.
pub async fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command).await
}

pub async fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Serve { config } => serve(&config).await,
        Command::Snapshot { config } => snapshot(&config),
    }
}

/// Ensure the vault root and history store exist, without starting the
/// server.
pub fn init(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let vault = VaultStore::open(&config.root_dir).map_err(|e| CliError::boot_failed(e.to_string()))?;
    let history = HistoryStore::new(vault.root());
    history.ensure_initialized().map_err(|e| CliError::boot_failed(e.to_string()))?;

    Logger::info("vault_initialized", &[("root_dir", &config.root_dir.display().to_string())]);
    Ok(())
}

/// Boot every component and serve until the process is terminated.
pub async fn serve(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let engine = boot(&config)?;

    crate::http_server::HttpServer::new(engine, config)
        .serve()
        .await
        .map_err(|e| CliError::io_error(e.to_string()))
}

/// Commit one history snapshot of the current vault state and exit.
pub fn snapshot(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let vault = VaultStore::open(&config.root_dir).map_err(|e| CliError::boot_failed(e.to_string()))?;
    let history = HistoryStore::new(vault.root());
    history.ensure_initialized().map_err(|e| CliError::boot_failed(e.to_string()))?;

    let files = vault.list_all().map_err(|e| CliError::boot_failed(e.to_string()))?;
    match history.commit(&files, "manual snapshot") {
        Ok(Some(id)) => Logger::info("snapshot_committed", &[("id", &id)]),
        Ok(None) => Logger::info("snapshot_skipped", &[("reason", "no changes since last snapshot")]),
        Err(e) => return Err(CliError::boot_failed(e.to_string())),
    }
    Ok(())
}

/// Construct every component and wire them into a [`SyncEngine`],
/// ready to be handed to the HTTP layer.
fn boot(config: &Config) -> CliResult<Arc<SyncEngine>> {
    let vault = Arc::new(VaultStore::open(&config.root_dir).map_err(|e| CliError::boot_failed(e.to_string()))?);
    let history = Arc::new(HistoryStore::new(vault.root()));
    history.ensure_initialized().map_err(|e| CliError::boot_failed(e.to_string()))?;
    let registry = Arc::new(ClientRegistry::new(vault.root()).map_err(|e| CliError::boot_failed(e.to_string()))?);
    let spool = Arc::new(Spool::new(vault.root()));
    let broadcaster = Arc::new(Broadcaster::new(registry.clone(), spool.clone()));

    Ok(Arc::new(SyncEngine::new(vault, history, registry, spool, broadcaster, config.resync_threshold)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(temp: &TempDir) -> std::path::PathBuf {
        let config_path = temp.path().join("yamanaka.json");
        let root_dir = temp.path().join("vault");
        fs::write(&config_path, format!(r#"{{"root_dir":"{}"}}"#, root_dir.display())).unwrap();
        config_path
    }

    #[test]
    fn init_creates_vault_and_history() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(&temp);

        init(&config_path).unwrap();

        assert!(temp.path().join("vault").is_dir());
        assert!(temp.path().join("vault").join(".history").join("log").exists());
    }

    #[test]
    fn snapshot_is_noop_on_empty_vault_after_first_commit() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(&temp);

        init(&config_path).unwrap();
        snapshot(&config_path).unwrap();
        snapshot(&config_path).unwrap();
    }
}
