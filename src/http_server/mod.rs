//! The HTTP layer: the request router, handlers, and the listen loop
//! that ties a [`crate::sync::SyncEngine`] to the outside world.

mod routes;
mod server;

pub use server::HttpServer;
