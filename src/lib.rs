//! yamanaka-server - a self-hosted sync server for a personal note vault
//!
//! Devices push and pull notes over HTTP, a server-sent event stream
//! keeps connected devices in sync in near real time, and every
//! accepted change is snapshotted into a content-addressed history.

pub mod broadcast;
pub mod cli;
pub mod history;
pub mod http_server;
pub mod observability;
pub mod registry;
pub mod spool;
pub mod sync;
pub mod vault;
