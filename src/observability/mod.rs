//! Observability: structured logging for the sync server.
//!
//! Every component logs through [`Logger`] rather than ad-hoc `println!`,
//! so operators get one JSON line per event regardless of which
//! component emitted it.

mod logger;

pub use logger::{Logger, Severity};
