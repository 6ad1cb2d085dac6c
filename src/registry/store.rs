//! The Client Registry: which devices this vault knows about, and which
//! of them currently hold an open event stream.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::broadcast::Event;
use crate::observability::Logger;
use crate::vault::CLIENTS_FILE_NAME;

use super::errors::{RegistryError, RegistryResult};

enum PersistJob {
    Write(HashSet<String>),
    #[cfg(test)]
    Sync(std_mpsc::Sender<()>),
}

/// A registry of tracked device ids and, for the subset currently
/// connected, a sender half of their event channel.
///
/// Registration and deregistration share one lock so that a reconnect
/// racing a disconnect always resolves deterministically: the newest
/// connection for a device id wins, and the previous channel's sender
/// is dropped as part of installing the new one, which closes it and
/// ends the old stream task.
pub struct ClientRegistry {
    tracked: Mutex<HashSet<String>>,
    active: Mutex<HashMap<String, mpsc::Sender<Event>>>,
    persist_tx: std_mpsc::Sender<PersistJob>,
}

impl ClientRegistry {
    pub fn new(vault_root: impl Into<PathBuf>) -> RegistryResult<Self> {
        let vault_root = vault_root.into();
        let tracked = Self::load_tracked(&vault_root)?;
        let persist_tx = Self::spawn_persister(vault_root.join(CLIENTS_FILE_NAME));
        Ok(Self { tracked: Mutex::new(tracked), active: Mutex::new(HashMap::new()), persist_tx })
    }

    /// `clients.json` is a JSON object of `device_id -> true`; the
    /// boolean value carries no meaning, only the key's presence does.
    fn load_tracked(vault_root: &PathBuf) -> RegistryResult<HashSet<String>> {
        let path = vault_root.join(CLIENTS_FILE_NAME);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(RegistryError::io("reading clients file", e)),
        };
        let ids: HashMap<String, bool> =
            serde_json::from_str(&contents).map_err(|e| RegistryError::Corrupt(e.to_string()))?;
        Ok(ids.into_keys().collect())
    }

    /// Spawn the background thread that owns all `clients.json` writes.
    /// `track()` only ever clones the in-memory set and hands it off
    /// here over a channel, so the membership lock is never held across
    /// disk I/O.
    fn spawn_persister(clients_path: PathBuf) -> std_mpsc::Sender<PersistJob> {
        let (tx, rx) = std_mpsc::channel::<PersistJob>();
        std::thread::spawn(move || {
            for job in rx {
                match job {
                    PersistJob::Write(tracked) => {
                        if let Err(e) = Self::write_tracked_file(&clients_path, &tracked) {
                            Logger::error("persist_tracked_failed", &[("error", &e.to_string())]);
                        }
                    }
                    #[cfg(test)]
                    PersistJob::Sync(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });
        tx
    }

    fn write_tracked_file(path: &Path, tracked: &HashSet<String>) -> RegistryResult<()> {
        let mut ids: Vec<&String> = tracked.iter().collect();
        ids.sort();
        let object: serde_json::Map<String, serde_json::Value> =
            ids.into_iter().map(|id| (id.clone(), serde_json::Value::Bool(true))).collect();
        let json = serde_json::to_string_pretty(&object).map_err(|e| RegistryError::Corrupt(e.to_string()))?;
        fs::write(path, json).map_err(|e| RegistryError::io("writing clients file", e))
    }

    /// Block until every persist job queued before this call has been
    /// written, for tests that need to observe `clients.json` on disk.
    #[cfg(test)]
    fn flush_persisted(&self) {
        let (tx, rx) = std_mpsc::channel();
        let _ = self.persist_tx.send(PersistJob::Sync(tx));
        let _ = rx.recv();
    }

    /// Is `device_id` known to this vault at all (connected or not)?
    pub fn is_tracked(&self, device_id: &str) -> bool {
        self.tracked.lock().expect("registry lock poisoned").contains(device_id)
    }

    /// All device ids this vault has ever tracked.
    pub fn all_tracked(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tracked.lock().expect("registry lock poisoned").iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Record `device_id` as known. Returns `true` if it was newly
    /// added, `false` if it was already tracked.
    ///
    /// Persisting the updated set to `clients.json` happens on the
    /// background persister thread; this call never blocks on disk I/O
    /// and never holds the membership lock across it.
    pub fn track(&self, device_id: &str) -> bool {
        let snapshot = {
            let mut tracked = self.tracked.lock().expect("registry lock poisoned");
            if tracked.contains(device_id) {
                return false;
            }
            tracked.insert(device_id.to_string());
            tracked.clone()
        };
        let _ = self.persist_tx.send(PersistJob::Write(snapshot));
        true
    }

    /// Install `sender` as the active channel for `device_id`.
    ///
    /// If a channel was already active for this id, it is replaced and
    /// returned so the caller can drop it, which closes the previous
    /// connection's receiver.
    pub fn register(&self, device_id: &str, sender: mpsc::Sender<Event>) -> Option<mpsc::Sender<Event>> {
        self.active.lock().expect("registry lock poisoned").insert(device_id.to_string(), sender)
    }

    /// Remove the active channel for `device_id`, but only if it is
    /// still the one identified by `expected` — a stale disconnect from
    /// a connection that has already been superseded must not evict the
    /// newer one.
    pub fn deregister(&self, device_id: &str, expected: &mpsc::Sender<Event>) {
        let mut active = self.active.lock().expect("registry lock poisoned");
        if let Some(current) = active.get(device_id) {
            if current.same_channel(expected) {
                active.remove(device_id);
            }
        }
    }

    pub fn is_active(&self, device_id: &str) -> bool {
        self.active.lock().expect("registry lock poisoned").contains_key(device_id)
    }

    pub fn active_sender(&self, device_id: &str) -> Option<mpsc::Sender<Event>> {
        self.active.lock().expect("registry lock poisoned").get(device_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().expect("registry lock poisoned").len()
    }

    /// Every currently connected device id and its sender, a stable
    /// snapshot for fan-out.
    pub fn active_snapshot(&self) -> Vec<(String, mpsc::Sender<Event>)> {
        self.active
            .lock()
            .expect("registry lock poisoned")
            .iter()
            .map(|(id, sender)| (id.clone(), sender.clone()))
            .collect()
    }
}
