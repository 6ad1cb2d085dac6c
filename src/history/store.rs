//! Content-addressed history store.
//!
//! Every commit hashes the full vault tree into a content id, stores a
//! full copy of that tree under `.history/objects/<id>/`, and appends a
//! line describing it to `.history/log`. There is no delta encoding;
//! the format favors simplicity and crash-safety over space.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::vault::{VaultFile, HISTORY_DIR_NAME};

use super::errors::{HistoryError, HistoryResult};

/// One line of `.history/log`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub parent: Option<String>,
}

pub struct HistoryStore {
    vault_root: PathBuf,
}

impl HistoryStore {
    pub fn new(vault_root: impl Into<PathBuf>) -> Self {
        Self { vault_root: vault_root.into() }
    }

    fn history_dir(&self) -> PathBuf {
        self.vault_root.join(HISTORY_DIR_NAME)
    }

    fn objects_dir(&self) -> PathBuf {
        self.history_dir().join("objects")
    }

    fn log_path(&self) -> PathBuf {
        self.history_dir().join("log")
    }

    /// Create `.history/` and an empty log if they don't already exist.
    /// Idempotent; safe to call on every startup.
    pub fn ensure_initialized(&self) -> HistoryResult<()> {
        fs::create_dir_all(self.objects_dir()).map_err(|e| HistoryError::io("creating history directory", e))?;
        let log_path = self.log_path();
        if !log_path.exists() {
            fs::File::create(&log_path).map_err(|e| HistoryError::io("creating history log", e))?;
        }
        Ok(())
    }

    /// Read every entry in `.history/log`, oldest first.
    pub fn log(&self) -> HistoryResult<Vec<LogEntry>> {
        let log_path = self.log_path();
        let file = match fs::File::open(&log_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HistoryError::io("opening history log", e)),
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| HistoryError::io("reading history log", e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry = serde_json::from_str(&line)
                .map_err(|e| HistoryError::Corrupt(format!("malformed log line: {}", e)))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// The most recently appended entry, if any.
    pub fn last_entry(&self) -> HistoryResult<Option<LogEntry>> {
        Ok(self.log()?.into_iter().last())
    }

    /// Snapshot `files` into a new content-addressed commit.
    ///
    /// Returns `Ok(None)` without touching disk if the tree's hash is
    /// identical to the last commit — a no-op mutation never grows the
    /// history.
    pub fn commit(&self, files: &[VaultFile], message: &str) -> HistoryResult<Option<String>> {
        let mut sorted: Vec<&VaultFile> = files.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        let id = Self::hash_tree(&sorted);
        let last = self.last_entry()?;
        if last.as_ref().map(|e| e.id.as_str()) == Some(id.as_str()) {
            return Ok(None);
        }

        let object_dir = self.objects_dir().join(&id);
        if !object_dir.exists() {
            for file in &sorted {
                let dest = object_dir.join(&file.path);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| HistoryError::io("creating object directory", e))?;
                }
                fs::write(&dest, &file.content).map_err(|e| HistoryError::io("writing history object", e))?;
            }
        }

        let entry = LogEntry {
            id: id.clone(),
            message: message.to_string(),
            timestamp: Utc::now(),
            parent: last.map(|e| e.id),
        };
        self.append_log(&entry)?;

        Ok(Some(id))
    }

    fn append_log(&self, entry: &LogEntry) -> HistoryResult<()> {
        let line = serde_json::to_string(entry).map_err(|e| HistoryError::Corrupt(e.to_string()))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .map_err(|e| HistoryError::io("opening history log for append", e))?;
        writeln!(file, "{}", line).map_err(|e| HistoryError::io("appending to history log", e))?;
        file.sync_all().map_err(|e| HistoryError::io("syncing history log", e))?;
        Ok(())
    }

    fn hash_tree(sorted: &[&VaultFile]) -> String {
        let mut hasher = Sha256::new();
        for file in sorted {
            hasher.update(file.path.as_bytes());
            hasher.update([0u8]);
            hasher.update((file.content.len() as u64).to_le_bytes());
            hasher.update(&file.content);
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(path: &str, content: &[u8]) -> VaultFile {
        VaultFile { path: path.to_string(), content: content.to_vec() }
    }

    #[test]
    fn ensure_initialized_creates_log_and_objects() {
        let temp = TempDir::new().unwrap();
        let history = HistoryStore::new(temp.path());
        history.ensure_initialized().unwrap();

        assert!(temp.path().join(HISTORY_DIR_NAME).join("log").exists());
        assert!(temp.path().join(HISTORY_DIR_NAME).join("objects").is_dir());
    }

    #[test]
    fn commit_appends_and_stores_object() {
        let temp = TempDir::new().unwrap();
        let history = HistoryStore::new(temp.path());
        history.ensure_initialized().unwrap();

        let files = vec![file("a.md", b"one")];
        let id = history.commit(&files, "initial").unwrap().expect("first commit is never a no-op");

        let log = history.log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, id);
        assert_eq!(log[0].parent, None);
        assert!(temp
            .path()
            .join(HISTORY_DIR_NAME)
            .join("objects")
            .join(&id)
            .join("a.md")
            .exists());
    }

    #[test]
    fn commit_is_noop_when_tree_is_unchanged() {
        let temp = TempDir::new().unwrap();
        let history = HistoryStore::new(temp.path());
        history.ensure_initialized().unwrap();

        let files = vec![file("a.md", b"one")];
        history.commit(&files, "initial").unwrap();
        let second = history.commit(&files, "no real change").unwrap();

        assert_eq!(second, None);
        assert_eq!(history.log().unwrap().len(), 1);
    }

    #[test]
    fn commit_chains_parent_ids() {
        let temp = TempDir::new().unwrap();
        let history = HistoryStore::new(temp.path());
        history.ensure_initialized().unwrap();

        let first_id = history.commit(&[file("a.md", b"one")], "first").unwrap().unwrap();
        let second_id = history.commit(&[file("a.md", b"two")], "second").unwrap().unwrap();

        assert_ne!(first_id, second_id);
        let log = history.log().unwrap();
        assert_eq!(log[1].parent, Some(first_id));
        assert_eq!(log[1].id, second_id);
    }
}
