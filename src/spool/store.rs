//! The Missed-Event Spool: a durable per-device backlog for events a
//! disconnected device wasn't around to receive.
//!
//! Each pending event is its own file, named by the nanosecond it was
//! appended so that draining in filename order reproduces append
//! order. Both the entry file and its parent directory are fsynced
//! before `append` returns, so a crash right after a mutation can never
//! silently drop a queued event.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::broadcast::Event;
use crate::observability::Logger;
use crate::vault::SPOOL_DIR_NAME;

use super::errors::{SpoolError, SpoolResult};

pub struct Spool {
    vault_root: PathBuf,
}

impl Spool {
    pub fn new(vault_root: impl Into<PathBuf>) -> Self {
        Self { vault_root: vault_root.into() }
    }

    fn device_dir(&self, device_id: &str) -> PathBuf {
        self.vault_root.join(SPOOL_DIR_NAME).join(device_id)
    }

    /// Append `event` to `device_id`'s backlog.
    pub fn append(&self, device_id: &str, event: &Event) -> SpoolResult<()> {
        let dir = self.device_dir(device_id);
        fs::create_dir_all(&dir).map_err(|e| SpoolError::io("creating spool directory", e))?;

        let path = self.unique_entry_path(&dir);
        let json = serde_json::to_vec(event).map_err(|e| SpoolError::Corrupt(e.to_string()))?;

        let file = File::create(&path).map_err(|e| SpoolError::io("creating spool entry", e))?;
        {
            use std::io::Write;
            let mut file = &file;
            file.write_all(&json).map_err(|e| SpoolError::io("writing spool entry", e))?;
        }
        file.sync_all().map_err(|e| SpoolError::io("syncing spool entry", e))?;
        Self::sync_dir(&dir)?;

        Ok(())
    }

    fn unique_entry_path(&self, dir: &Path) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
        let mut path = dir.join(format!("{}.json", nanos));
        let mut suffix = 1;
        while path.exists() {
            path = dir.join(format!("{}-{}.json", nanos, suffix));
            suffix += 1;
        }
        path
    }

    #[cfg(unix)]
    fn sync_dir(dir: &Path) -> SpoolResult<()> {
        let dir_file = File::open(dir).map_err(|e| SpoolError::io("opening spool directory", e))?;
        dir_file.sync_all().map_err(|e| SpoolError::io("syncing spool directory", e))
    }

    #[cfg(not(unix))]
    fn sync_dir(_dir: &Path) -> SpoolResult<()> {
        Ok(())
    }

    /// Read and remove every pending event for `device_id`, oldest
    /// first. A device with no backlog directory has an empty backlog,
    /// not an error.
    pub fn drain(&self, device_id: &str) -> SpoolResult<Vec<Event>> {
        let dir = self.device_dir(device_id);
        let mut entries = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .map(|e| e.map(|e| e.path()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| SpoolError::io("reading spool directory", e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SpoolError::io("reading spool directory", e)),
        };
        entries.sort();

        let mut events = Vec::with_capacity(entries.len());
        for path in entries {
            let contents = fs::read(&path).map_err(|e| SpoolError::io("reading spool entry", e))?;
            let event: Event = match serde_json::from_slice(&contents) {
                Ok(event) => event,
                Err(e) => {
                    Logger::error(
                        "spool_entry_corrupt",
                        &[("path", &path.display().to_string()), ("error", &e.to_string())],
                    );
                    continue;
                }
            };
            events.push(event);
            fs::remove_file(&path).map_err(|e| SpoolError::io("removing drained spool entry", e))?;
        }

        Ok(events)
    }

    /// Number of pending events for `device_id`, without draining them.
    pub fn pending_count(&self, device_id: &str) -> SpoolResult<usize> {
        let dir = self.device_dir(device_id);
        match fs::read_dir(&dir) {
            Ok(entries) => Ok(entries.count()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(SpoolError::io("reading spool directory", e)),
        }
    }
}
