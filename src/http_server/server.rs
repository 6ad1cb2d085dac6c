//! The HTTP server: router assembly, CORS, the background snapshotter,
//! and the listen loop.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::cli::Config;
use crate::observability::Logger;
use crate::sync::SyncEngine;

use super::routes::{build_routes, AppState};

pub struct HttpServer {
    engine: Arc<SyncEngine>,
    config: Config,
}

impl HttpServer {
    pub fn new(engine: Arc<SyncEngine>, config: Config) -> Self {
        Self { engine, config }
    }

    /// Build the router without binding a listener, for embedding in
    /// tests that drive requests directly with `tower::ServiceExt`.
    pub fn router(&self) -> Router {
        self.build_router()
    }

    fn build_router(&self) -> Router {
        let state = Arc::new(AppState {
            engine: self.engine.clone(),
            heartbeat_interval: self.config.heartbeat_interval(),
        });

        let cors = match self.config.allowed_origin.parse::<HeaderValue>() {
            Ok(origin) => CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
            Err(_) => {
                Logger::warn("invalid_allowed_origin", &[("allowed_origin", &self.config.allowed_origin)]);
                CorsLayer::new()
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([axum::http::header::CONTENT_TYPE])
            }
        };

        build_routes(state).layer(cors)
    }

    fn spawn_snapshotter(&self) {
        let engine = self.engine.clone();
        let interval = self.config.snapshot_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                engine.periodic_snapshot();
            }
        });
    }

    pub async fn serve(self) -> std::io::Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_address
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;

        self.spawn_snapshotter();
        let router = self.build_router();

        Logger::info("server_starting", &[("listen_address", &self.config.listen_address)]);
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::history::HistoryStore;
    use crate::registry::ClientRegistry;
    use crate::spool::Spool;
    use crate::vault::VaultStore;
    use tempfile::TempDir;

    fn engine(temp: &TempDir) -> Arc<SyncEngine> {
        let vault = Arc::new(VaultStore::open(temp.path()).unwrap());
        let history = Arc::new(HistoryStore::new(temp.path()));
        history.ensure_initialized().unwrap();
        let registry = Arc::new(ClientRegistry::new(temp.path()).unwrap());
        let spool = Arc::new(Spool::new(temp.path()));
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), spool.clone()));
        Arc::new(SyncEngine::new(vault, history, registry, spool, broadcaster, 10))
    }

    #[test]
    fn build_router_succeeds_with_default_config() {
        let temp = TempDir::new().unwrap();
        let config = Config { root_dir: temp.path().to_path_buf(), ..Config::default() };
        let server = HttpServer::new(engine(&temp), config);
        let _router = server.build_router();
    }

    #[test]
    fn build_router_falls_back_on_invalid_origin() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            root_dir: temp.path().to_path_buf(),
            allowed_origin: "not a valid header value \n".to_string(),
            ..Config::default()
        };
        let server = HttpServer::new(engine(&temp), config);
        let _router = server.build_router();
    }
}
