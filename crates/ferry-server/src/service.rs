//! Handlers for the `/api/bus` surface. Every mutation answers
//! `202 Accepted`; reads answer JSON.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use ferry_core::headers;
use ferry_core::queue::DEFAULT_ACK_TIMEOUT_MINUTES;
use ferry_core::{BusError, Event, PolledEvent, QueueInfo};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::{is_replicated, AppState};
use crate::error::ApiError;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQueueParams {
    pub queue_name: String,
    #[serde(default = "default_partitions")]
    pub number_of_partitions: usize,
    #[serde(default = "default_ack_timeout")]
    pub max_ack_timeout: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleParams {
    pub queue_name: String,
    pub number_of_partitions: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueParams {
    pub queue_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryParams {
    pub queue_name: String,
    pub delivery_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub node_id: String,
    pub is_leader: bool,
}

fn default_partitions() -> usize {
    1
}

fn default_ack_timeout() -> u32 {
    DEFAULT_ACK_TIMEOUT_MINUTES
}

pub async fn create_queue(
    State(state): State<AppState>,
    params: Result<Query<CreateQueueParams>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let Query(params) = params?;
    state
        .bus
        .create_queue(
            &params.queue_name,
            params.max_ack_timeout,
            params.number_of_partitions,
            true,
            &state.shutdown,
        )
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn scale_partitions(
    State(state): State<AppState>,
    params: Result<Query<ScaleParams>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let Query(params) = params?;
    state
        .bus
        .scale_partitions(
            &params.queue_name,
            params.number_of_partitions,
            true,
            &state.shutdown,
        )
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Client pushes get their delivery headers filled in; replicated pushes
/// are stored exactly as the leader stored them.
pub async fn push_event(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    params: Result<Query<QueueParams>, QueryRejection>,
    event: Result<Json<Event>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Query(params) = params?;
    let Json(mut event) = event?;
    if !is_replicated(&request_headers) {
        headers::add_default_headers(&mut event, Utc::now());
    }
    state
        .bus
        .push_event(&params.queue_name, event, true, &state.shutdown)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn ack(
    State(state): State<AppState>,
    params: Result<Query<DeliveryParams>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let Query(params) = params?;
    state
        .bus
        .ack(&params.queue_name, params.delivery_id, true, &state.shutdown)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn ack_and_move_to_dead_letter(
    State(state): State<AppState>,
    params: Result<Query<DeliveryParams>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let Query(params) = params?;
    state
        .bus
        .ack_and_move_to_dead_letter_queue(
            &params.queue_name,
            params.delivery_id,
            true,
            &state.shutdown,
        )
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Mirror of a leader poll, registering the leader's delivery id.
pub async fn replicated_poll(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    params: Result<Query<DeliveryParams>, QueryRejection>,
) -> ApiResult<StatusCode> {
    if !is_replicated(&request_headers) {
        return Err(BusError::InvalidOperation(
            "polls with a preset delivery id are accepted from the leader only".to_string(),
        )
        .into());
    }
    let Query(params) = params?;
    state
        .bus
        .poll_with_delivery_id(
            &params.queue_name,
            Some(params.delivery_id),
            true,
            &state.shutdown,
        )
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn clear(
    State(state): State<AppState>,
    params: Result<Query<QueueParams>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let Query(params) = params?;
    state
        .bus
        .clear(&params.queue_name, true, &state.shutdown)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn delete_queue(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.bus.delete_queue(&name, true, &state.shutdown).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn poll(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<PolledEvent>> {
    let polled = state.bus.poll(&name, true, &state.shutdown).await?;
    Ok(Json(polled))
}

pub async fn peek(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<PolledEvent>> {
    Ok(Json(state.bus.peek(&name, &state.shutdown).await?))
}

pub async fn queue_info(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<QueueInfo>> {
    Ok(Json(state.bus.queue_info(&name, &state.shutdown).await?))
}

pub async fn list_queues(State(state): State<AppState>) -> ApiResult<Json<Vec<QueueInfo>>> {
    Ok(Json(state.bus.list_queues(&state.shutdown).await?))
}

pub async fn node_info(State(state): State<AppState>) -> Json<NodeInfo> {
    Json(NodeInfo {
        node_id: state.node_id.clone(),
        is_leader: state.bus.is_leader(),
    })
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}
