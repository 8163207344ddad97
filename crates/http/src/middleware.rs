//! Per-IP rate limiting and request latency recording.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::AppState;
use crate::api_error::RETRY_AFTER_SECONDS;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window request counter per client IP.
pub struct RateLimiter {
    rpm: u32,
    window: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(rpm: u32) -> Self {
        Self { rpm, window: Mutex::new(HashMap::new()) }
    }

    /// Record one request for `client` and return whether it is allowed.
    pub fn allow(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut window = self.window.lock().expect("rate limiter lock poisoned");
        let hits = window.entry(client.to_owned()).or_default();
        hits.retain(|t| now.duration_since(*t) < RATE_WINDOW);
        if hits.len() >= self.rpm as usize {
            return false;
        }
        hits.push(now);
        true
    }
}

fn exempt_from_rate_limit(path: &str) -> bool {
    path == "/" || path.starts_with("/metrics") || path.starts_with("/health") || path.starts_with("/app")
}

/// Return 429 with `Retry-After` when the per-IP budget for the sliding
/// 60-second window is spent. Operational paths are exempt.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if exempt_from_rate_limit(request.uri().path()) {
        return next.run(request).await;
    }
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_owned(), |ci| ci.0.ip().to_string());
    if !state.rate_limiter.allow(&client) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, RETRY_AFTER_SECONDS.to_string())],
            Json(serde_json::json!({
                "detail": "Rate limit exceeded. Retry after the indicated time."
            })),
        )
            .into_response();
    }
    next.run(request).await
}

/// Record request latency for the metrics histogram.
pub async fn track_latency(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_owned();
    let start = Instant::now();
    let response = next.run(request).await;
    threadsight_service::metrics::record_request_duration(
        &method,
        &path,
        start.elapsed().as_secs_f64(),
    );
    response
}
