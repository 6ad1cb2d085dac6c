//! HTTP routes: the five request endpoints plus the event stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::broadcast::Event;
use crate::sync::{FilePatch, SyncEngine, SyncError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl ErrorResponse {
    fn new(code: &'static str, error: impl Into<String>) -> Self {
        Self { error: error.into(), code }
    }
}

fn sync_error_status(error: &SyncError) -> StatusCode {
    match error {
        SyncError::BadRequest(_) => StatusCode::BAD_REQUEST,
        SyncError::Archive(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SyncError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> axum::response::Response {
        let status = sync_error_status(&self);
        (status, Json(ErrorResponse::new(self.code(), self.to_string()))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct DeviceIdQuery {
    #[serde(default)]
    pub device_id: Option<String>,
}

impl DeviceIdQuery {
    fn require(self) -> Result<String, SyncError> {
        match self.device_id {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(SyncError::BadRequest("device_id query parameter is required".to_string())),
        }
    }
}

pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub heartbeat_interval: Duration,
}

/// Per-subscriber channel depth. A slow or momentarily unpolled stream
/// can absorb a burst of this many events before the broadcaster falls
/// back to spooling them, matching the non-blocking delivery guarantee
/// the spool exists to provide.
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/check", get(check_handler))
        .route("/api/sync/pull", get(pull_handler))
        .route("/api/sync/push", post(push_handler))
        .route("/api/sync/initial", post(initial_handler))
        .route("/api/events", get(events_handler))
        .with_state(state)
}

async fn check_handler(State(state): State<Arc<AppState>>) -> Json<crate::sync::HealthStatus> {
    Json(state.engine.health())
}

async fn pull_handler(State(state): State<Arc<AppState>>) -> Result<Json<PullResponse>, SyncError> {
    let files = state.engine.pull()?;
    Ok(Json(PullResponse { files }))
}

#[derive(Debug, Serialize)]
struct PullResponse {
    files: Vec<crate::sync::WireFile>,
}

#[derive(Debug, Deserialize)]
struct PushRequest {
    #[serde(default)]
    files_to_update: Vec<FilePatch>,
    #[serde(default)]
    files_to_delete: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn push_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeviceIdQuery>,
    Json(request): Json<PushRequest>,
) -> Result<Json<StatusResponse>, SyncError> {
    let sender = query.require()?;
    state.engine.push(&sender, &request.files_to_update, &request.files_to_delete);
    Ok(Json(StatusResponse { status: "success, push processed and changes broadcasted" }))
}

async fn initial_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeviceIdQuery>,
    body: axum::body::Bytes,
) -> Result<Json<StatusResponse>, SyncError> {
    let sender = query.require()?;
    if body.is_empty() {
        return Err(SyncError::BadRequest("request body must be a gzipped tar stream".to_string()));
    }
    state.engine.initial_replace(&sender, &body)?;
    Ok(Json(StatusResponse { status: "success, initial sync processed. Other clients notified." }))
}

/// Deregisters a device's channel when dropped, whether the stream ends
/// normally or is torn down early by the client disconnecting — the
/// code after the relay loop below never runs in the latter case, since
/// hyper simply drops the stream at its current suspension point.
struct ConnectionGuard {
    engine: Arc<SyncEngine>,
    device_id: String,
    sender: mpsc::Sender<Event>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.engine.disconnect(&self.device_id, &self.sender);
    }
}

async fn events_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeviceIdQuery>,
) -> Result<impl IntoResponse, SyncError> {
    let device_id = query.require()?;
    let heartbeat_interval = state.heartbeat_interval;
    let engine = state.engine.clone();

    let (mut rx, tx, catchup) = engine.connect(&device_id, EVENT_CHANNEL_CAPACITY);
    let guard = ConnectionGuard { engine, device_id, sender: tx };

    let stream = stream! {
        let _guard = guard;

        for event in catchup {
            yield Ok::<_, Infallible>(SseEvent::default().event(event.name()).data(event.to_sse_data()));
        }

        let mut ticker = tokio::time::interval(heartbeat_interval);
        ticker.tick().await; // first tick fires immediately; discard it

        loop {
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Some(event) => yield Ok::<_, Infallible>(SseEvent::default().event(event.name()).data(event.to_sse_data())),
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    yield Ok::<_, Infallible>(SseEvent::default().comment("heartbeat"));
                }
            }
        }
    };

    let headers = [
        (axum::http::header::CACHE_CONTROL, "no-cache"),
        (axum::http::header::CONNECTION, "keep-alive"),
    ];
    Ok((headers, Sse::new(stream)))
}
