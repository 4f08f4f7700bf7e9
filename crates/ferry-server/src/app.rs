//! Router wiring and shared handler state.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use ferry_core::headers::{DATA_SYNC, DATA_SYNC_VALUE};
use ferry_core::{BusError, EventBus};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::service;

#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<EventBus>,
    pub node_id: String,
    /// Cancelled on shutdown; in-flight bus calls waiting on a queue give up.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(bus: Arc<EventBus>, node_id: impl Into<String>) -> Self {
        Self {
            bus,
            node_id: node_id.into(),
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // poll moves an event into the pending store, so it counts as a write
    let writes = Router::new()
        .route("/queue", post(service::create_queue))
        .route("/queue/scale", post(service::scale_partitions))
        .route("/queue/event", post(service::push_event))
        .route("/queue/ack", post(service::ack))
        .route("/queue/deadletter", post(service::ack_and_move_to_dead_letter))
        .route("/queue/poll", post(service::replicated_poll))
        .route("/queue/clear", post(service::clear))
        .route("/queue/event/:name", get(service::poll))
        .route("/queue/:name", delete(service::delete_queue))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_leader));

    let reads = Router::new()
        .route("/queue/event/peek/:name", get(service::peek))
        .route("/queue/info/:name", get(service::queue_info))
        .route("/queues", get(service::list_queues));

    Router::new()
        .nest("/api/bus", writes.merge(reads))
        .route("/api/cluster/node", get(service::node_info))
        .route("/health", get(service::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Whether the request is leader-originated replication traffic.
pub fn is_replicated(request_headers: &axum::http::HeaderMap) -> bool {
    request_headers
        .get(DATA_SYNC)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(DATA_SYNC_VALUE))
}

/// Only the leader takes client writes. Followers accept replication traffic.
async fn require_leader(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if is_replicated(request.headers()) || state.bus.is_leader() {
        return next.run(request).await;
    }
    tracing::debug!(uri = %request.uri(), "rejected client request on follower");
    ApiError::from(BusError::InvalidOperation(
        "this node is not the leader".to_string(),
    ))
    .into_response()
}
