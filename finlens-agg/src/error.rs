//! HTTP error mapping for finlens-agg
//!
//! Every handler error becomes a `{"error": {"code", "message"}}` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::aggregate_fetcher::AggregateError;
use crate::services::artifact_generator::GenerationError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Superseded or cancelled request (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Core upstream data unavailable or generation failed upstream (502)
    #[error("Upstream failure: {0}")]
    BadGateway(String),

    /// Generated output could not be repaired (502)
    #[error("Malformed generation: {0}")]
    MalformedGeneration(String),

    /// finlens-common error (database, config, ...)
    #[error("Common error: {0}")]
    Common(#[from] finlens_common::Error),
}

impl From<AggregateError> for ApiError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::CoreSliceUnavailable { .. } => ApiError::BadGateway(err.to_string()),
            AggregateError::Superseded { .. } => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Aggregate(inner) => inner.into(),
            GenerationError::Upstream { .. } => ApiError::BadGateway(err.to_string()),
            GenerationError::Malformed(_) => ApiError::MalformedGeneration(err.to_string()),
            GenerationError::Cancelled => ApiError::Conflict(err.to_string()),
            GenerationError::Persistence(inner) => inner.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE", msg),
            ApiError::MalformedGeneration(msg) => {
                (StatusCode::BAD_GATEWAY, "MALFORMED_GENERATION", msg)
            }
            ApiError::Common(ref err) => {
                let (status, code) = match err {
                    finlens_common::Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    finlens_common::Error::InvalidInput(_) => {
                        (StatusCode::BAD_REQUEST, "BAD_REQUEST")
                    }
                    finlens_common::Error::Database(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR")
                    }
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
                };
                (status, code, err.to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, message = %message, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
