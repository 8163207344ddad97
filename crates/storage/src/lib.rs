//! Durable state for threadsight: conversations, tweets, insights, and the
//! analysis cache, backed by PostgreSQL via sqlx.

pub mod error;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod pg;
pub mod traits;

pub use error::StorageError;
#[cfg(any(test, feature = "memory"))]
pub use memory::MemoryStore;
pub use pg::PgStorage;
pub use traits::{
    CacheStore, ConversationStore, InsightFilter, InsightPage, InsightStore, Store, Thread,
    TrendSample,
};
