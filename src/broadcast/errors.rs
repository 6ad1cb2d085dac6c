//! Broadcaster error taxonomy.

use std::fmt;

use crate::spool::SpoolError;

#[derive(Debug)]
pub enum BroadcastError {
    Spool(SpoolError),
}

impl BroadcastError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Spool(_) => "STORAGE_ERROR",
        }
    }
}

impl From<SpoolError> for BroadcastError {
    fn from(source: SpoolError) -> Self {
        Self::Spool(source)
    }
}

impl fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spool(source) => write!(f, "broadcast spool error: {}", source),
        }
    }
}

impl std::error::Error for BroadcastError {}

pub type BroadcastResult<T> = Result<T, BroadcastError>;
