//! Mutation Handler error taxonomy — the subset of failures that abort
//! a whole request rather than being recovered per-file.

use std::fmt;

use crate::vault::VaultError;

#[derive(Debug)]
pub enum SyncError {
    /// The request body was missing a required field or malformed.
    BadRequest(String),
    /// A tar/gzip stream was not well-formed.
    Archive(String),
    /// A filesystem failure that aborts the whole request (pull, or
    /// the clean/extract steps of an initial replace).
    Storage(String),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Archive(_) => "ARCHIVE_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<VaultError> for SyncError {
    fn from(source: VaultError) -> Self {
        match source {
            VaultError::Archive(msg) => Self::Archive(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "bad request: {}", msg),
            Self::Archive(msg) => write!(f, "archive error: {}", msg),
            Self::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}

pub type SyncResult<T> = Result<T, SyncError>;
