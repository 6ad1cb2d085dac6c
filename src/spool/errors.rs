//! Missed-Event Spool error taxonomy.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum SpoolError {
    Io(String),
    Corrupt(String),
}

impl SpoolError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io(format!("{}: {}", context.into(), source))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "STORAGE_ERROR",
            Self::Corrupt(_) => "SPOOL_CORRUPT",
        }
    }
}

impl fmt::Display for SpoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "spool storage error: {}", msg),
            Self::Corrupt(msg) => write!(f, "spool corrupt: {}", msg),
        }
    }
}

impl std::error::Error for SpoolError {}

pub type SpoolResult<T> = Result<T, SpoolError>;
