//! Metric recording helpers. Names follow the `conversation_insights_*`
//! family; the Prometheus recorder is installed by the binary.

use metrics::{counter, gauge, histogram};

/// Record request latency for one handled HTTP request.
pub fn record_request_duration(method: &str, path: &str, seconds: f64) {
    histogram!(
        "conversation_insights_request_duration_seconds",
        "method" => method.to_owned(),
        "path" => path.to_owned(),
    )
    .record(seconds);
}

/// Record a successful Grok call with its token and cost usage.
pub fn record_grok_success(tokens: u64, cost_usd: Option<f64>) {
    counter!("conversation_insights_grok_requests_total", "status" => "success").increment(1);
    if tokens > 0 {
        counter!("conversation_insights_grok_tokens_total").increment(tokens);
    }
    if let Some(cost) = cost_usd {
        // The counter facade is integral; account cost in micro-USD ticks.
        counter!("conversation_insights_grok_cost_usd_ticks_total")
            .increment((cost * 1_000_000.0) as u64);
    }
}

/// Record a failed Grok call.
pub fn record_grok_error() {
    counter!("conversation_insights_grok_requests_total", "status" => "error").increment(1);
}

/// Count one rejected ingest due to a full queue.
pub fn record_backpressure() {
    counter!("conversation_insights_backpressure_events_total").increment(1);
}

/// Update the queue depth gauge.
pub fn set_queue_depth(depth: usize) {
    gauge!("conversation_insights_queue_depth").set(depth as f64);
}
