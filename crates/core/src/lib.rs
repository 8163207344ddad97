//! Core domain types and pure logic for the threadsight pipeline.
//!
//! Everything here is side-effect free: message normalization, thread root
//! inference, the pre-filter heuristic, the content fingerprint used for
//! analysis dedup, and environment configuration.

pub mod config;
pub mod fingerprint;
pub mod json_utils;
pub mod normalizer;
pub mod pre_filter;
pub mod thread;

pub use config::Settings;
pub use fingerprint::thread_hash;
pub use json_utils::strip_json_fence;
pub use pre_filter::PreFilterDecision;
pub use thread::{Conversation, Insight, NewInsight, NormalizedMessage, Tweet};
