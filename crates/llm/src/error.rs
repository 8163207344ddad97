//! Typed error enum for the LLM crate.

use std::time::Duration;

use thiserror::Error;

/// Errors from Grok API calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("GROK_API_KEY not set")]
    MissingApiKey,
    /// The circuit breaker refused the call; no request was made.
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("rate limited by upstream (429)")]
    RateLimited,
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("empty response: no choices returned")]
    EmptyResponse,
    #[error("client initialization failed: {0}")]
    ClientInit(String),
}

impl LlmError {
    /// Whether this error is transient and should be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Transport(_))
    }

    /// Stable error code recorded in logs and metrics, e.g. `http_503`.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::MissingApiKey => "missing_api_key".to_owned(),
            Self::CircuitOpen => "circuit_open".to_owned(),
            Self::RateLimited => "rate_limit".to_owned(),
            Self::HttpStatus(code) => format!("http_{code}"),
            Self::Timeout => "timeout".to_owned(),
            Self::Transport(_) => "transport".to_owned(),
            Self::EmptyResponse => "no_choices".to_owned(),
            Self::ClientInit(_) => "client_init".to_owned(),
        }
    }

    /// Backoff before retry `attempt + 1`. Rate limiting backs off twice as
    /// hard as timeouts and transport faults.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = if matches!(self, Self::RateLimited) { 2.0 } else { 1.0 };
        Duration::from_secs_f64(factor * f64::from(attempt + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(LlmError::RateLimited.is_transient());
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::Transport("reset".to_owned()).is_transient());
        assert!(!LlmError::HttpStatus(500).is_transient());
        assert!(!LlmError::CircuitOpen.is_transient());
        assert!(!LlmError::EmptyResponse.is_transient());
    }

    #[test]
    fn error_codes() {
        assert_eq!(LlmError::HttpStatus(503).code(), "http_503");
        assert_eq!(LlmError::CircuitOpen.code(), "circuit_open");
        assert_eq!(LlmError::EmptyResponse.code(), "no_choices");
    }

    #[test]
    fn rate_limit_backs_off_harder() {
        assert_eq!(LlmError::RateLimited.backoff(0), Duration::from_secs(2));
        assert_eq!(LlmError::RateLimited.backoff(1), Duration::from_secs(4));
        assert_eq!(LlmError::Timeout.backoff(0), Duration::from_secs(1));
        assert_eq!(LlmError::Timeout.backoff(2), Duration::from_secs(3));
    }
}
