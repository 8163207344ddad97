//! Grok API integration: chat-completions client, circuit breaker, and
//! insight JSON parsing.

pub mod ai_types;
pub mod breaker;
pub mod client;
pub mod error;

pub use breaker::{CircuitBreaker, CircuitState};
pub use client::{Analysis, GrokClient, format_thread};
pub use error::LlmError;

#[cfg(test)]
mod retry_tests;
