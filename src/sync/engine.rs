//! The Mutation Handlers: push, initial replace, pull, and health —
//! wired to the Vault Store, History Snapshotter, Client Registry,
//! Spool, and Broadcaster.

use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::broadcast::{Broadcaster, Event};
use crate::history::HistoryStore;
use crate::observability::Logger;
use crate::registry::ClientRegistry;
use crate::spool::Spool;
use crate::vault::{VaultFile, VaultStore};

use super::errors::SyncResult;

/// One entry of a push's `files_to_update` list, content still base64.
#[derive(Debug, Clone, Deserialize)]
pub struct FilePatch {
    pub path: String,
    pub content: String,
}

/// A pulled file, content base64-encoded for the wire.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WireFile {
    pub path: String,
    pub content: String,
}

impl From<VaultFile> for WireFile {
    fn from(file: VaultFile) -> Self {
        Self { path: file.path, content: BASE64.encode(file.content) }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub active_devices: usize,
}

pub struct SyncEngine {
    vault: Arc<VaultStore>,
    history: Arc<HistoryStore>,
    registry: Arc<ClientRegistry>,
    spool: Arc<Spool>,
    broadcaster: Arc<Broadcaster>,
    resync_threshold: usize,
    started_at: Instant,
}

impl SyncEngine {
    pub fn new(
        vault: Arc<VaultStore>,
        history: Arc<HistoryStore>,
        registry: Arc<ClientRegistry>,
        spool: Arc<Spool>,
        broadcaster: Arc<Broadcaster>,
        resync_threshold: usize,
    ) -> Self {
        Self { vault, history, registry, spool, broadcaster, resync_threshold, started_at: Instant::now() }
    }

    /// Apply a push. Per-file failures are logged and skipped; the
    /// overall response is always success, matching the spec's
    /// partial-progress guarantee.
    pub fn push(&self, sender: &str, files_to_update: &[FilePatch], files_to_delete: &[String]) {
        for path in files_to_delete {
            match self.vault.delete(path) {
                Ok(()) => {
                    let event = Event::FileDeleted { path: path.clone() };
                    self.fan_out(&event, sender);
                }
                Err(e) => {
                    Logger::warn("push_delete_failed", &[("path", path), ("error", &e.to_string())]);
                }
            }
        }

        for patch in files_to_update {
            let bytes = match BASE64.decode(&patch.content) {
                Ok(bytes) => bytes,
                Err(e) => {
                    Logger::warn("push_decode_failed", &[("path", &patch.path), ("error", &e.to_string())]);
                    continue;
                }
            };

            match self.vault.write(&patch.path, &bytes) {
                Ok(()) => {
                    let event = Event::FileUpdated { path: patch.path.clone(), content: patch.content.clone() };
                    self.fan_out(&event, sender);
                }
                Err(e) => {
                    Logger::warn("push_write_failed", &[("path", &patch.path), ("error", &e.to_string())]);
                }
            }
        }

        self.snapshot(&format!("client push from {}", sender));
    }

    /// Wholesale vault replacement from a gzipped tar stream.
    pub fn initial_replace(&self, sender: &str, gz_bytes: &[u8]) -> SyncResult<()> {
        self.vault.clean_except_history()?;
        self.vault.extract_targz(gz_bytes)?;

        let event = Event::FullSyncRequired { message: format!("vault replaced by {}", sender) };
        self.fan_out(&event, sender);

        self.snapshot(&format!("initial sync from {}", sender));
        Ok(())
    }

    /// The full current vault listing.
    pub fn pull(&self) -> SyncResult<Vec<WireFile>> {
        let files = self.vault.list_all()?;
        Ok(files.into_iter().map(WireFile::from).collect())
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            uptime_seconds: self.started_at.elapsed().as_secs(),
            active_devices: self.registry.active_count(),
        }
    }

    /// Register a newly connected device's channel and compute the
    /// catch-up events it should be sent before entering the relay
    /// loop, per the resync threshold policy.
    pub fn connect(
        &self,
        device_id: &str,
        channel_capacity: usize,
    ) -> (mpsc::Receiver<Event>, mpsc::Sender<Event>, Vec<Event>) {
        self.registry.track(device_id);

        let (tx, rx) = mpsc::channel(channel_capacity);
        let displaced = self.registry.register(device_id, tx.clone());
        drop(displaced);

        let drained = match self.spool.drain(device_id) {
            Ok(events) => events,
            Err(e) => {
                Logger::error("spool_drain_failed", &[("device_id", device_id), ("error", &e.to_string())]);
                Vec::new()
            }
        };

        let catchup = if drained.len() > self.resync_threshold {
            vec![Event::FullSyncRequired { message: format!("{} missed updates", drained.len()) }]
        } else {
            drained
        };

        (rx, tx, catchup)
    }

    /// Tear down a device's active registration at disconnect.
    pub fn disconnect(&self, device_id: &str, sender: &mpsc::Sender<Event>) {
        self.registry.deregister(device_id, sender);
    }

    /// Commit a history snapshot on the fixed interval timer, independent
    /// of any client activity.
    pub fn periodic_snapshot(&self) {
        self.snapshot("periodic snapshot");
    }

    fn fan_out(&self, event: &Event, sender: &str) {
        if let Err(e) = self.broadcaster.broadcast(event, sender) {
            Logger::error("broadcast_failed", &[("event", event.name()), ("error", &e.to_string())]);
        }
    }

    /// Commits run under the vault's exclusive lock for the whole
    /// read-then-commit sequence, so a concurrent write can never land
    /// between the tree listing this reads and the commit it produces.
    fn snapshot(&self, message: &str) {
        let result = self.vault.with_exclusive_snapshot(|files| self.history.commit(files, message));
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => Logger::error("snapshot_failed", &[("message", message), ("error", &e.to_string())]),
            Err(e) => Logger::error("snapshot_list_failed", &[("message", message), ("error", &e.to_string())]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine(temp: &TempDir) -> SyncEngine {
        let vault = Arc::new(VaultStore::open(temp.path()).unwrap());
        let history = Arc::new(HistoryStore::new(temp.path()));
        history.ensure_initialized().unwrap();
        let registry = Arc::new(ClientRegistry::new(temp.path()).unwrap());
        let spool = Arc::new(Spool::new(temp.path()));
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), spool.clone()));
        SyncEngine::new(vault, history, registry, spool, broadcaster, 10)
    }

    #[test]
    fn push_then_pull_roundtrip() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);

        engine.push("A", &[FilePatch { path: "n.md".into(), content: "aGVsbG8=".into() }], &[]);

        let files = engine.pull().unwrap();
        assert_eq!(files, vec![WireFile { path: "n.md".into(), content: "aGVsbG8=".into() }]);
    }

    #[test]
    fn push_delete_removes_file() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        engine.push("A", &[FilePatch { path: "n.md".into(), content: "aGVsbG8=".into() }], &[]);
        engine.push("A", &[], &["n.md".to_string()]);

        assert_eq!(engine.pull().unwrap(), Vec::new());
    }

    #[test]
    fn push_skips_bad_path_and_keeps_good_one() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);

        engine.push(
            "A",
            &[
                FilePatch { path: "../evil".into(), content: "eA==".into() },
                FilePatch { path: "ok.md".into(), content: "eQ==".into() },
            ],
            &[],
        );

        let files = engine.pull().unwrap();
        assert_eq!(files, vec![WireFile { path: "ok.md".into(), content: "eQ==".into() }]);
        assert!(!temp.path().parent().unwrap().join("evil").exists());
    }

    #[test]
    fn health_reports_active_device_count() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let (_rx, _tx, _catchup) = engine.connect("A", 8);

        let status = engine.health();
        assert_eq!(status.status, "ok");
        assert_eq!(status.active_devices, 1);
    }

    #[test]
    fn connect_tracks_device_and_drains_spool_under_threshold() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        engine.spool.append("B", &Event::FileDeleted { path: "a.md".into() }).unwrap();

        let (_rx, _tx, catchup) = engine.connect("B", 8);

        assert_eq!(catchup, vec![Event::FileDeleted { path: "a.md".into() }]);
        assert!(engine.registry.is_tracked("B"));
    }

    #[test]
    fn connect_signals_full_sync_over_threshold() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        for i in 0..11 {
            engine.spool.append("B", &Event::FileDeleted { path: format!("{}.md", i) }).unwrap();
        }

        let (_rx, _tx, catchup) = engine.connect("B", 8);

        assert_eq!(catchup.len(), 1);
        assert!(matches!(catchup[0], Event::FullSyncRequired { .. }));
    }
}
