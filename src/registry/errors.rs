//! Client Registry error taxonomy.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum RegistryError {
    Io(String),
    Corrupt(String),
}

impl RegistryError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io(format!("{}: {}", context.into(), source))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "STORAGE_ERROR",
            Self::Corrupt(_) => "REGISTRY_CORRUPT",
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "registry storage error: {}", msg),
            Self::Corrupt(msg) => write!(f, "registry corrupt: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}

pub type RegistryResult<T> = Result<T, RegistryError>;
