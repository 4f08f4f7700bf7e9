//! HTTP error shape shared by every handler.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use ferry_core::BusError;
use serde::{Deserialize, Serialize};

/// Body of every non-2xx response: a stable snake_case `code` plus a
/// human-readable `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Couples a status code with a JSON error body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_argument", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<BusError> for ApiError {
    fn from(err: BusError) -> Self {
        let (status, code) = match &err {
            BusError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            BusError::InvalidEvent(_) => (StatusCode::BAD_REQUEST, "invalid_event"),
            BusError::InvalidOperation(_) => (StatusCode::BAD_REQUEST, "invalid_operation"),
            BusError::EventNotFound(_) => (StatusCode::BAD_REQUEST, "event_not_found"),
            BusError::QueueNotFound(_) => (StatusCode::NOT_FOUND, "queue_not_found"),
            BusError::NoEventFound(_) => (StatusCode::NOT_FOUND, "no_event_found"),
            BusError::QueueAlreadyExists(_) => (StatusCode::CONFLICT, "queue_already_exists"),
            BusError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
        };
        Self::new(status, code, err.to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid_argument(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_event", rejection.body_text())
    }
}
