//! The Broadcaster: fans out vault mutations to every other tracked
//! device, falling back to the spool when a device can't take the
//! event immediately.

mod broadcaster;
mod errors;
mod event;

pub use broadcaster::Broadcaster;
pub use errors::{BroadcastError, BroadcastResult};
pub use event::Event;
