#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use ferry_core::{EventBus, EventLimits, StaticLeadership};
use ferry_server::app::{build_router, AppState};

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Marks a request as leader-originated replication traffic.
pub fn replicated(mut request: Request<Body>) -> Request<Body> {
    request
        .headers_mut()
        .insert("x-data-sync", "true".parse().expect("header"));
    request
}

pub fn bus(leader: bool) -> Arc<EventBus> {
    Arc::new(
        EventBus::new(EventLimits::default())
            .with_leadership(Arc::new(StaticLeadership::new(leader))),
    )
}

pub fn router(bus: Arc<EventBus>, node_id: &str) -> Router {
    build_router(AppState::new(bus, node_id))
}
