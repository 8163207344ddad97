//! HTTP API server (Axum).

pub mod api_error;
pub mod api_types;
pub mod handlers;
pub mod metrics;
pub mod middleware;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use threadsight_core::Settings;
use threadsight_service::WorkQueue;
use threadsight_storage::Store;
use tower_http::cors::CorsLayer;

pub use api_error::ApiError;
pub use middleware::RateLimiter;

/// Shared state injected into every handler. Explicit construction keeps
/// tests deterministic; nothing here is a process global except the metrics
/// recorder.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub queue: Arc<WorkQueue>,
    pub settings: Settings,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, queue: Arc<WorkQueue>, settings: Settings) -> Self {
        let rate_limiter = RateLimiter::new(settings.rate_limit_rpm);
        Self { store, queue, settings, rate_limiter }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/conversations", post(handlers::ingest::create_conversation))
        .route("/api/v1/conversations/bulk", post(handlers::ingest::create_conversations_bulk))
        .route(
            "/api/v1/conversations/bulk/stream",
            post(handlers::ingest::create_conversations_bulk_stream),
        )
        .route("/api/v1/insights", get(handlers::insights::list_insights))
        .route("/api/v1/trends", get(handlers::trends::get_trends))
        .route("/health", get(handlers::ops::health))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(axum::middleware::from_fn(middleware::track_latency))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::rate_limit,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
