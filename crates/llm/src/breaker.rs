//! Three-state circuit breaker around the Grok endpoint.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing; calls are refused until the cooldown elapses.
    Open,
    /// One trial call allowed.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
}

/// Stops calling Grok after `failure_threshold` consecutive failures; permits
/// a trial call once `cooldown` has elapsed. All transitions happen under one
/// mutex.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Whether a call may proceed right now. When open and the cooldown has
    /// elapsed, flips to half-open and permits the trial call.
    #[must_use]
    pub fn can_call(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if inner.opened_at.is_some_and(|t| t.elapsed() >= self.cooldown) {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            },
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failures = 0;
                tracing::info!("circuit breaker closed after successful trial call");
            },
            CircuitState::Closed => inner.failures = 0,
            CircuitState::Open => {},
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            tracing::warn!("trial call failed, circuit breaker re-opened");
            return;
        }
        inner.failures += 1;
        if inner.failures >= self.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            tracing::warn!(failures = inner.failures, "circuit breaker opened");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().expect("circuit breaker lock poisoned")
    }
}
