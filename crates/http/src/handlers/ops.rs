//! Health endpoint for load balancers and container healthchecks.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::api_types::HealthResponse;

/// GET /health
///
/// The process id is included so operators can tell when health probes hit
/// different processes — the queue is per-process, so depth readings from
/// multiple workers are misleading.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        queue_depth: state.queue.depth(),
        process_id: std::process::id(),
    })
}
