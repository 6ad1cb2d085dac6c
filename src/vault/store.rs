//! The Vault Store: all reads and writes of vault contents on local disk.

use std::fs::{self, File as FsFile};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use super::errors::{VaultError, VaultResult};
use super::path::{normalize_relative, to_wire_path};

/// Hidden directory the [`crate::history`] module commits snapshots into.
pub const HISTORY_DIR_NAME: &str = ".history";
/// Directory the [`crate::spool`] module stores per-device backlogs in.
pub const SPOOL_DIR_NAME: &str = "missed_events";
/// File the [`crate::registry`] module persists tracked device ids to.
pub const CLIENTS_FILE_NAME: &str = "clients.json";

/// One file in the vault, as seen by the rest of the system (raw bytes,
/// not yet base64-encoded — that happens at the wire boundary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultFile {
    pub path: String,
    pub content: Vec<u8>,
}

/// All reads and writes of vault contents, serialized by a single
/// process-wide reader-writer lock shared with the history snapshotter.
pub struct VaultStore {
    root: PathBuf,
    lock: RwLock<()>,
}

impl VaultStore {
    /// Open (creating if necessary) a vault rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> VaultResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| VaultError::io("creating vault root", e))?;
        Ok(Self { root, lock: RwLock::new(()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the vault, skipping reserved directories, returning every
    /// regular file found.
    pub fn list_all(&self) -> VaultResult<Vec<VaultFile>> {
        let _guard = self.lock.read().expect("vault lock poisoned");
        let mut files = Vec::new();
        self.walk(&self.root, &mut files)?;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Run `f` with a full listing of the vault's current files, holding
    /// the **exclusive** lock for the whole call. The history
    /// snapshotter needs the read-then-commit sequence to be atomic
    /// with respect to concurrent writes; an ordinary listing only
    /// needs a shared lock and should use [`Self::list_all`] instead.
    pub fn with_exclusive_snapshot<T>(&self, f: impl FnOnce(&[VaultFile]) -> T) -> VaultResult<T> {
        let _guard = self.lock.write().expect("vault lock poisoned");
        let mut files = Vec::new();
        self.walk(&self.root, &mut files)?;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(f(&files))
    }

    fn walk(&self, dir: &Path, out: &mut Vec<VaultFile>) -> VaultResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(VaultError::io(format!("reading directory {}", dir.display()), e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| VaultError::io("reading directory entry", e))?;
            let path = entry.path();
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();

            if path == self.root.join(HISTORY_DIR_NAME) || path == self.root.join(SPOOL_DIR_NAME) {
                continue;
            }
            if dir == self.root && (name == HISTORY_DIR_NAME || name == SPOOL_DIR_NAME) {
                continue;
            }

            let file_type = entry.file_type().map_err(|e| VaultError::io("stat'ing entry", e))?;
            if file_type.is_dir() {
                self.walk(&path, out)?;
            } else if file_type.is_file() {
                let relative = path.strip_prefix(&self.root).unwrap_or(&path);
                let content = fs::read(&path).map_err(|e| VaultError::io(format!("reading {}", path.display()), e))?;
                out.push(VaultFile { path: to_wire_path(relative), content });
            }
        }

        Ok(())
    }

    /// Write `bytes` to `path`, creating parent directories as needed.
    pub fn write(&self, path: &str, bytes: &[u8]) -> VaultResult<()> {
        let relative = normalize_relative(path)?;
        let _guard = self.lock.write().expect("vault lock poisoned");
        self.write_locked(&relative, bytes)
    }

    fn write_locked(&self, relative: &Path, bytes: &[u8]) -> VaultResult<()> {
        let full_path = self.root.join(relative);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(|e| VaultError::io("creating parent directories", e))?;
        }
        fs::write(&full_path, bytes).map_err(|e| VaultError::io(format!("writing {}", full_path.display()), e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&full_path, fs::Permissions::from_mode(0o644));
        }
        Ok(())
    }

    /// Remove a single file. A missing file is not an error at this layer.
    pub fn delete(&self, path: &str) -> VaultResult<()> {
        let relative = normalize_relative(path)?;
        let _guard = self.lock.write().expect("vault lock poisoned");
        let full_path = self.root.join(&relative);
        match fs::remove_file(&full_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::io(format!("deleting {}", full_path.display()), e)),
        }
    }

    /// Remove every top-level entry except the history and spool
    /// directories.
    pub fn clean_except_history(&self) -> VaultResult<()> {
        let _guard = self.lock.write().expect("vault lock poisoned");
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(VaultError::io("reading vault root", e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| VaultError::io("reading vault root entry", e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == HISTORY_DIR_NAME || name == SPOOL_DIR_NAME {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| VaultError::io("stat'ing entry", e))?;
            let result = if file_type.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| VaultError::io(format!("removing {}", path.display()), e))?;
        }

        Ok(())
    }

    /// Decompress a gzipped tar stream into the vault root.
    ///
    /// Extraction is staged into a sibling temporary directory first and
    /// then moved into place entry-by-entry, so a malformed archive never
    /// leaves a half-written tree directly under the vault root.
    pub fn extract_targz(&self, gz_bytes: &[u8]) -> VaultResult<()> {
        let staging = self.root.with_extension("sync_tmp");
        if staging.exists() {
            let _ = fs::remove_dir_all(&staging);
        }
        fs::create_dir_all(&staging).map_err(|e| VaultError::io("creating staging directory", e))?;

        let extraction = Self::stage_archive(gz_bytes, &staging);
        let result = extraction.and_then(|()| {
            let _guard = self.lock.write().expect("vault lock poisoned");
            Self::move_staged_entries(&staging, &self.root)
        });

        let _ = fs::remove_dir_all(&staging);
        result
    }

    fn stage_archive(gz_bytes: &[u8], staging: &Path) -> VaultResult<()> {
        let decoder = GzDecoder::new(gz_bytes);
        let mut archive = Archive::new(decoder);
        let entries = archive.entries().map_err(|e| VaultError::Archive(e.to_string()))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| VaultError::Archive(e.to_string()))?;
            match entry.header().entry_type() {
                EntryType::Directory | EntryType::Regular => {}
                other => {
                    return Err(VaultError::Archive(format!("unsupported tar entry kind: {:?}", other)));
                }
            }

            let entry_path = entry.path().map_err(|e| VaultError::Archive(e.to_string()))?;
            let relative = normalize_relative(&entry_path.to_string_lossy())
                .map_err(|_| VaultError::Archive(format!("archive entry escapes vault: {}", entry_path.display())))?;
            let dest = staging.join(&relative);

            if entry.header().entry_type() == EntryType::Directory {
                fs::create_dir_all(&dest).map_err(|e| VaultError::io("creating staged directory", e))?;
            } else {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| VaultError::io("creating staged parent", e))?;
                }
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer).map_err(|e| VaultError::Archive(e.to_string()))?;
                fs::write(&dest, &buffer).map_err(|e| VaultError::io("writing staged entry", e))?;
            }
        }

        Ok(())
    }

    fn move_staged_entries(staging: &Path, root: &Path) -> VaultResult<()> {
        let entries = fs::read_dir(staging).map_err(|e| VaultError::io("reading staging directory", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| VaultError::io("reading staged entry", e))?;
            let dest = root.join(entry.file_name());
            if dest.exists() {
                if dest.is_dir() {
                    fs::remove_dir_all(&dest).map_err(|e| VaultError::io("replacing staged directory", e))?;
                } else {
                    fs::remove_file(&dest).map_err(|e| VaultError::io("replacing staged file", e))?;
                }
            }
            fs::rename(entry.path(), &dest).map_err(|e| VaultError::io("moving staged entry into place", e))?;
        }
        Ok(())
    }

    /// Read a file directly, used by the history store to build a
    /// snapshot (already holds the vault lock via the caller).
    pub(crate) fn read_raw(path: &Path) -> VaultResult<Vec<u8>> {
        let mut file = FsFile::open(path).map_err(|e| VaultError::io(format!("opening {}", path.display()), e))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).map_err(|e| VaultError::io(format!("reading {}", path.display()), e))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn make_targz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            for (path, content) in entries {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, path, *content).unwrap();
            }
            builder.finish().unwrap();
        }
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&tar_bytes).unwrap();
        gz.finish().unwrap()
    }

    #[test]
    fn write_read_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = VaultStore::open(temp.path()).unwrap();
        store.write("notes/a.md", b"hello").unwrap();

        let files = store.list_all().unwrap();
        assert_eq!(files, vec![VaultFile { path: "notes/a.md".into(), content: b"hello".to_vec() }]);
    }

    #[test]
    fn list_all_skips_reserved_dirs() {
        let temp = TempDir::new().unwrap();
        let store = VaultStore::open(temp.path()).unwrap();
        store.write("real.md", b"x").unwrap();
        fs::create_dir_all(temp.path().join(HISTORY_DIR_NAME)).unwrap();
        fs::write(temp.path().join(HISTORY_DIR_NAME).join("log"), b"ignored").unwrap();
        fs::create_dir_all(temp.path().join(SPOOL_DIR_NAME).join("dev-a")).unwrap();
        fs::write(temp.path().join(SPOOL_DIR_NAME).join("dev-a").join("1.json"), b"{}").unwrap();

        let files = store.list_all().unwrap();
        assert_eq!(files, vec![VaultFile { path: "real.md".into(), content: b"x".to_vec() }]);
    }

    #[test]
    fn with_exclusive_snapshot_sees_current_files() {
        let temp = TempDir::new().unwrap();
        let store = VaultStore::open(temp.path()).unwrap();
        store.write("a.md", b"x").unwrap();

        let paths = store.with_exclusive_snapshot(|files| files.iter().map(|f| f.path.clone()).collect::<Vec<_>>()).unwrap();
        assert_eq!(paths, vec!["a.md".to_string()]);
    }

    #[test]
    fn delete_missing_file_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let store = VaultStore::open(temp.path()).unwrap();
        assert!(store.delete("nope.md").is_ok());
    }

    #[test]
    fn write_rejects_escaping_path() {
        let temp = TempDir::new().unwrap();
        let store = VaultStore::open(temp.path()).unwrap();
        let result = store.write("../evil", b"x");
        assert!(matches!(result, Err(VaultError::BadPath(_))));
        assert!(!temp.path().parent().unwrap().join("evil").exists());
    }

    #[test]
    fn clean_except_history_preserves_reserved_dirs() {
        let temp = TempDir::new().unwrap();
        let store = VaultStore::open(temp.path()).unwrap();
        store.write("a.md", b"x").unwrap();
        fs::create_dir_all(temp.path().join(HISTORY_DIR_NAME)).unwrap();
        fs::write(temp.path().join(HISTORY_DIR_NAME).join("log"), b"keep").unwrap();

        store.clean_except_history().unwrap();

        assert!(!temp.path().join("a.md").exists());
        assert!(temp.path().join(HISTORY_DIR_NAME).join("log").exists());
    }

    #[test]
    fn extract_targz_populates_vault() {
        let temp = TempDir::new().unwrap();
        let store = VaultStore::open(temp.path()).unwrap();
        let archive = make_targz(&[("x/y.md", b"hello")]);

        store.extract_targz(&archive).unwrap();

        let files = store.list_all().unwrap();
        assert_eq!(files, vec![VaultFile { path: "x/y.md".into(), content: b"hello".to_vec() }]);
    }

    #[test]
    fn extract_targz_rejects_path_escape() {
        let temp = TempDir::new().unwrap();
        let store = VaultStore::open(temp.path()).unwrap();
        let archive = make_targz(&[("../evil", b"x")]);

        let result = store.extract_targz(&archive);
        assert!(result.is_err());
        assert!(!temp.path().parent().unwrap().join("evil").exists());
    }
}
