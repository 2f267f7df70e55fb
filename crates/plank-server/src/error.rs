//! HTTP error mapping.
//!
//! Handlers return [`ApiError`]; this module maps the store/relay error
//! taxonomy onto status codes and a uniform `{"error": "..."}` JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use plank_core::errors::RelayError;
use plank_store::StoreError;
use serde_json::json;
use tracing::error;

/// Error type for all HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// 404 with a message naming the missing thing.
    NotFound(String),
    /// 400, client sent something unusable.
    BadRequest(String),
    /// 503, the server is draining.
    ShuttingDown,
    /// 500, details logged, message withheld from the client.
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ObjectNotFound(id) => Self::NotFound(format!("object {id} not found")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::SessionNotFound(id) => {
                Self::NotFound(format!("session {id} not found"))
            }
            RelayError::ShuttingDown => Self::ShuttingDown,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::ShuttingDown => {
                (StatusCode::SERVICE_UNAVAILABLE, "shutting down".to_owned())
            }
            Self::Internal(message) => {
                error!(%message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
