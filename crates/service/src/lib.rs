//! The ingest-to-analysis pipeline: a bounded in-process work queue, the
//! rate/pace controller for outbound Grok calls, and the worker that drains
//! the queue through pre-filter, cache, client, and store.

pub mod metrics;
pub mod pacer;
pub mod queue;
pub mod worker;

pub use pacer::PaceController;
pub use queue::WorkQueue;
pub use worker::{Worker, WorkerConfig};
