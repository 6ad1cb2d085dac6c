//! History Snapshotter error taxonomy.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum HistoryError {
    /// A filesystem operation under `.history` failed.
    Io(String),
    /// A log line or object on disk was not well-formed.
    Corrupt(String),
}

impl HistoryError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io(format!("{}: {}", context.into(), source))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "STORAGE_ERROR",
            Self::Corrupt(_) => "HISTORY_CORRUPT",
        }
    }
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "history storage error: {}", msg),
            Self::Corrupt(msg) => write!(f, "history corrupt: {}", msg),
        }
    }
}

impl std::error::Error for HistoryError {}

pub type HistoryResult<T> = Result<T, HistoryError>;
