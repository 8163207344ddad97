//! Storage trait abstraction.
//!
//! Splitting the store into domain traits keeps the worker and HTTP layer
//! independent of the concrete backend; the in-memory backend implements the
//! same contracts for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use threadsight_core::{Insight, NewInsight, NormalizedMessage};
use uuid::Uuid;

use crate::error::StorageError;

/// Ordered message texts of one conversation plus its root id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub texts: Vec<String>,
    pub root_tweet_id: String,
}

/// Filters for the insights listing. All fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct InsightFilter {
    pub conversation_id: Option<Uuid>,
    /// Inclusive lower bound on `created_at`.
    pub date_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub date_to: Option<DateTime<Utc>>,
    pub sentiment: Option<String>,
    /// Requires the topic string to appear in the insight's topics list.
    pub topic: Option<String>,
}

/// One page of insights plus the unpaginated match count.
#[derive(Debug, Clone)]
pub struct InsightPage {
    pub items: Vec<Insight>,
    pub total: i64,
}

/// Minimal projection of an insight used by trend aggregation.
#[derive(Debug, Clone)]
pub struct TrendSample {
    pub created_at: DateTime<Utc>,
    pub sentiment: Option<String>,
    pub topics: Option<Vec<String>>,
    pub gaps: Option<Vec<String>>,
}

/// Conversation and tweet persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Locate the conversation for `root_tweet_id`, creating it if absent, and
    /// insert every message not already stored. Existing tweets are never
    /// updated. A concurrent insert of the same root is resolved by re-reading
    /// the winner's row.
    async fn upsert_conversation(
        &self,
        messages: &[NormalizedMessage],
        root_tweet_id: &str,
    ) -> Result<Uuid, StorageError>;

    /// Load the conversation's message texts ordered by timestamp ascending,
    /// ties broken by tweet id. `None` when the conversation doesn't exist.
    async fn load_thread(&self, conversation_id: Uuid) -> Result<Option<Thread>, StorageError>;
}

/// Insight persistence and queries.
#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Insert the insight for a conversation. Fails with
    /// [`StorageError::InsightExists`] when one is already present.
    async fn insert_insight(
        &self,
        conversation_id: Uuid,
        insight: NewInsight,
    ) -> Result<Uuid, StorageError>;

    async fn get_insight(&self, conversation_id: Uuid) -> Result<Option<Insight>, StorageError>;

    /// List non-skipped insights matching `filter`, newest first.
    async fn list_insights(
        &self,
        filter: &InsightFilter,
        limit: i64,
        offset: i64,
    ) -> Result<InsightPage, StorageError>;

    /// Non-skipped insights created on or after `since`, for trend aggregation.
    async fn insights_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TrendSample>, StorageError>;
}

/// Content-addressed analysis cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_cached(&self, thread_hash: &str) -> Result<Option<Uuid>, StorageError>;

    /// Record `thread_hash → conversation_id`. First writer wins; a duplicate
    /// hash is silently ignored.
    async fn set_cached(&self, thread_hash: &str, conversation_id: Uuid)
    -> Result<(), StorageError>;
}

/// Full store contract, for trait objects shared across handlers and worker.
pub trait Store: ConversationStore + InsightStore + CacheStore {}

impl<T: ConversationStore + InsightStore + CacheStore> Store for T {}
