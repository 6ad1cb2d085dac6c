//! The Mutation Handlers: push, initial replace, pull, and health,
//! tying the Vault Store to the History Snapshotter, Client Registry,
//! Spool, and Broadcaster.

mod engine;
mod errors;

pub use engine::{FilePatch, HealthStatus, SyncEngine, WireFile};
pub use errors::{SyncError, SyncResult};
