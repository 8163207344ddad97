//! Rate/pace controller for outbound Grok calls.
//!
//! Enforces the requests-per-minute spacing and tracks a rolling latency
//! window to adjust an advisory concurrency figure: grow while healthy,
//! shrink on errors. The concurrency value is exposed for observation and
//! future gating, not enforced as a semaphore.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

const MAX_LATENCY_SAMPLES: usize = 20;
/// p95 latency must stay under this for concurrency to grow.
const GROWTH_P95_CEILING_SECS: f64 = 5.0;

#[derive(Debug)]
struct Window {
    latencies: VecDeque<f64>,
    successes: u64,
    failures: u64,
    tokens_this_minute: u64,
    current: usize,
}

#[derive(Debug)]
pub struct PaceController {
    min_interval: Duration,
    min_size: usize,
    max_size: usize,
    last_call: tokio::sync::Mutex<Option<Instant>>,
    window: std::sync::Mutex<Window>,
}

impl PaceController {
    #[must_use]
    pub fn new(rpm: u32, min_size: usize, max_size: usize) -> Self {
        let min_interval = if rpm > 0 {
            Duration::from_secs_f64(60.0 / f64::from(rpm))
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            min_size,
            max_size,
            last_call: tokio::sync::Mutex::new(None),
            window: std::sync::Mutex::new(Window {
                latencies: VecDeque::with_capacity(MAX_LATENCY_SAMPLES),
                successes: 0,
                failures: 0,
                tokens_this_minute: 0,
                current: 2.clamp(min_size, max_size),
            }),
        }
    }

    /// Suspend until the minimum inter-call interval has elapsed, then stamp
    /// this call. Serialized, so concurrent callers space out one by one.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_call.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Record a successful call; concurrency may grow while p95 stays low.
    pub fn record_success(&self, latency: Duration, tokens: u64) {
        let mut w = self.window.lock().expect("pacer window lock poisoned");
        w.successes += 1;
        w.tokens_this_minute += tokens;
        if w.latencies.len() == MAX_LATENCY_SAMPLES {
            w.latencies.pop_front();
        }
        w.latencies.push_back(latency.as_secs_f64());
        if let Some(p95) = p95_latency(&w.latencies) {
            if p95 < GROWTH_P95_CEILING_SECS && w.current < self.max_size {
                w.current += 1;
            }
        }
    }

    /// Record a failed call; concurrency shrinks toward the floor.
    pub fn record_failure(&self) {
        let mut w = self.window.lock().expect("pacer window lock poisoned");
        w.failures += 1;
        w.current = w.current.saturating_sub(1).max(self.min_size);
    }

    /// Advisory concurrency for the worker to cap outstanding calls.
    #[must_use]
    pub fn current_concurrency(&self) -> usize {
        self.window.lock().expect("pacer window lock poisoned").current
    }
}

fn p95_latency(samples: &VecDeque<f64>) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = samples.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = (sorted.len() as f64 * 0.95) as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}
