//! The History Snapshotter: a minimal content-addressed commit log kept
//! alongside the vault, used to recover from bad pushes and to decide
//! whether an initial replace actually changed anything.

mod errors;
mod store;

pub use errors::{HistoryError, HistoryResult};
pub use store::{HistoryStore, LogEntry};
