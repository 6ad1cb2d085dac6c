//! Vault Store error taxonomy.

use std::fmt;
use std::io;

/// Errors raised by the [`super::VaultStore`].
#[derive(Debug)]
pub enum VaultError {
    /// A path escaped the vault root or named a reserved directory.
    BadPath(String),
    /// A filesystem operation failed.
    Io(String),
    /// A tar/gzip stream was not well-formed.
    Archive(String),
}

impl VaultError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io(format!("{}: {}", context.into(), source))
    }

    /// Stable error code, used in log lines and HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadPath(_) => "BAD_PATH",
            Self::Io(_) => "STORAGE_ERROR",
            Self::Archive(_) => "ARCHIVE_ERROR",
        }
    }
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadPath(p) => write!(f, "path escapes vault root: {}", p),
            Self::Io(msg) => write!(f, "storage error: {}", msg),
            Self::Archive(msg) => write!(f, "archive error: {}", msg),
        }
    }
}

impl std::error::Error for VaultError {}

pub type VaultResult<T> = Result<T, VaultError>;
