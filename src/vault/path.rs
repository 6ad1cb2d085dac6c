//! Path safety: every path handed to the vault is validated here before
//! it touches the filesystem.

use std::path::{Component, Path, PathBuf};

use super::errors::VaultError;

/// Names that are reserved at the vault root and can never be addressed
/// as a file path.
pub const RESERVED_TOP_LEVEL: &[&str] = &[super::HISTORY_DIR_NAME, super::SPOOL_DIR_NAME];

/// Normalize a client-supplied POSIX-style relative path and reject any
/// attempt to escape the vault root or touch a reserved directory.
///
/// Rejects: absolute paths, empty paths, `..` components (before or
/// after normalization), and paths whose first segment is reserved.
pub fn normalize_relative(path: &str) -> Result<PathBuf, VaultError> {
    if path.is_empty() {
        return Err(VaultError::BadPath(path.to_string()));
    }

    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return Err(VaultError::BadPath(path.to_string()));
    }

    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(VaultError::BadPath(path.to_string()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(VaultError::BadPath(path.to_string()));
    }

    if let Some(Component::Normal(first)) = normalized.components().next() {
        let first = first.to_string_lossy();
        if RESERVED_TOP_LEVEL.iter().any(|r| *r == first) {
            return Err(VaultError::BadPath(path.to_string()));
        }
    }

    Ok(normalized)
}

/// Convert an OS path (already rooted under the vault) back to the
/// forward-slash wire form.
pub fn to_wire_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_relative_path() {
        assert_eq!(normalize_relative("notes/a.md").unwrap(), PathBuf::from("notes/a.md"));
    }

    #[test]
    fn rejects_parent_dir_escape() {
        assert!(normalize_relative("../etc/passwd").is_err());
        assert!(normalize_relative("notes/../../etc/passwd").is_err());
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(normalize_relative("/etc/passwd").is_err());
    }

    #[test]
    fn rejects_empty_path() {
        assert!(normalize_relative("").is_err());
    }

    #[test]
    fn rejects_reserved_directory() {
        assert!(normalize_relative("missed_events/x/1.json").is_err());
        assert!(normalize_relative(".history/objects/foo").is_err());
    }

    #[test]
    fn to_wire_path_uses_forward_slashes() {
        let p = PathBuf::from("a").join("b").join("c.md");
        assert_eq!(to_wire_path(&p), "a/b/c.md");
    }
}
