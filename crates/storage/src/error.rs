//! Typed error enum for the storage crate.

use thiserror::Error;
use uuid::Uuid;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An insight row already exists for this conversation. Callers that only
    /// need at-most-once semantics treat this as success.
    #[error("insight already exists for conversation {0}")]
    InsightExists(Uuid),
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
