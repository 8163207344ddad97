//! Typed API error for HTTP handlers.
//!
//! Handlers return `Result<_, ApiError>`; conversion to a response carries
//! the right status code and a `{"detail": …}` JSON body. Internal failures
//! are logged server-side and never leak details to the client.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use threadsight_storage::StorageError;

/// Seconds clients should wait before retrying after backpressure or rate
/// limiting.
pub const RETRY_AFTER_SECONDS: u32 = 60;

#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request — e.g. bulk payload over the configured cap.
    BadRequest(String),
    /// 422 Unprocessable Entity — schema-valid JSON that fails validation.
    Validation(String),
    /// 422 Unprocessable Entity — no thread root could be inferred.
    NoRoot,
    /// 503 Service Unavailable with `Retry-After` — the work queue is full.
    QueueFull,
    /// 500 Internal Server Error. Details logged, not exposed.
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, Json(serde_json::json!({"detail": detail})))
                    .into_response()
            },
            Self::Validation(detail) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(serde_json::json!({"detail": detail})))
                    .into_response()
            },
            Self::NoRoot => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "detail": "Could not determine root tweet id from messages."
                })),
            )
                .into_response(),
            Self::QueueFull => (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, RETRY_AFTER_SECONDS.to_string())],
                Json(serde_json::json!({
                    "detail": "Queue at capacity. Retry after the indicated time."
                })),
            )
                .into_response(),
            Self::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"detail": "An internal error occurred."})),
                )
                    .into_response()
            },
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::Internal(err.into())
    }
}
