//! In-memory backend with the same observable semantics as the PostgreSQL
//! one. Test-only (feature `memory`): worker and handler tests run against it
//! without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use threadsight_core::{Conversation, Insight, NewInsight, NormalizedMessage, Tweet};
use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::{
    CacheStore, ConversationStore, InsightFilter, InsightPage, InsightStore, Thread, TrendSample,
};

#[derive(Default)]
struct Inner {
    conversations: Vec<Conversation>,
    tweets: Vec<Tweet>,
    insights: Vec<Insight>,
    cache: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Insert an insight with an explicit timestamp (for time-window tests).
    pub fn insert_insight_at(
        &self,
        conversation_id: Uuid,
        insight: NewInsight,
        created_at: DateTime<Utc>,
    ) -> Result<Uuid, StorageError> {
        let mut inner = self.lock();
        if inner.insights.iter().any(|i| i.conversation_id == conversation_id) {
            return Err(StorageError::InsightExists(conversation_id));
        }
        let id = Uuid::new_v4();
        inner.insights.push(Insight {
            id,
            conversation_id,
            grok_output: insight.grok_output,
            sentiment: insight.sentiment,
            topics: insight.topics,
            gaps: insight.gaps,
            prompt_tokens: insight.prompt_tokens,
            completion_tokens: insight.completion_tokens,
            cost_estimate: insight.cost_estimate,
            created_at,
            skipped_reason: insight.skipped_reason,
        });
        Ok(id)
    }

    /// Snapshot of every insight row, skipped ones included.
    #[must_use]
    pub fn all_insights(&self) -> Vec<Insight> {
        self.lock().insights.clone()
    }

    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.lock().cache.len()
    }
}

fn matches(filter: &InsightFilter, insight: &Insight) -> bool {
    if insight.skipped_reason.is_some() {
        return false;
    }
    if filter.conversation_id.is_some_and(|cid| cid != insight.conversation_id) {
        return false;
    }
    if filter.date_from.is_some_and(|from| insight.created_at < from) {
        return false;
    }
    if filter.date_to.is_some_and(|to| insight.created_at >= to) {
        return false;
    }
    if filter.sentiment.as_ref().is_some_and(|s| insight.sentiment.as_ref() != Some(s)) {
        return false;
    }
    if let Some(ref topic) = filter.topic {
        return insight.topics.as_ref().is_some_and(|topics| topics.contains(topic));
    }
    true
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn upsert_conversation(
        &self,
        messages: &[NormalizedMessage],
        root_tweet_id: &str,
    ) -> Result<Uuid, StorageError> {
        let mut inner = self.lock();
        let now = Utc::now();
        let existing =
            inner.conversations.iter().find(|c| c.root_tweet_id == root_tweet_id).map(|c| c.id);
        let conversation_id = existing.unwrap_or_else(|| {
            let id = Uuid::new_v4();
            inner.conversations.push(Conversation {
                id,
                root_tweet_id: root_tweet_id.to_owned(),
                created_at: now,
                updated_at: now,
            });
            id
        });
        let mut added = false;
        for m in messages {
            if inner.tweets.iter().any(|t| t.id == m.tweet_id) {
                continue;
            }
            inner.tweets.push(Tweet {
                id: m.tweet_id.clone(),
                conversation_id,
                author_id: m.author_id.clone(),
                text: m.text.clone(),
                in_reply_to_id: m.in_reply_to_id.clone(),
                quoted_id: m.quoted_id.clone(),
                inbound: m.inbound,
                created_at: m.created_at.unwrap_or(now),
                created_at_raw: m.created_at_raw.clone(),
            });
            added = true;
        }
        if added {
            if let Some(c) = inner.conversations.iter_mut().find(|c| c.id == conversation_id) {
                c.updated_at = now;
            }
        }
        Ok(conversation_id)
    }

    async fn load_thread(&self, conversation_id: Uuid) -> Result<Option<Thread>, StorageError> {
        let inner = self.lock();
        let Some(conv) = inner.conversations.iter().find(|c| c.id == conversation_id) else {
            return Ok(None);
        };
        let mut tweets: Vec<&Tweet> =
            inner.tweets.iter().filter(|t| t.conversation_id == conversation_id).collect();
        tweets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(Some(Thread {
            texts: tweets.iter().map(|t| t.text.clone()).collect(),
            root_tweet_id: conv.root_tweet_id.clone(),
        }))
    }
}

#[async_trait]
impl InsightStore for MemoryStore {
    async fn insert_insight(
        &self,
        conversation_id: Uuid,
        insight: NewInsight,
    ) -> Result<Uuid, StorageError> {
        self.insert_insight_at(conversation_id, insight, Utc::now())
    }

    async fn get_insight(&self, conversation_id: Uuid) -> Result<Option<Insight>, StorageError> {
        Ok(self.lock().insights.iter().find(|i| i.conversation_id == conversation_id).cloned())
    }

    async fn list_insights(
        &self,
        filter: &InsightFilter,
        limit: i64,
        offset: i64,
    ) -> Result<InsightPage, StorageError> {
        let inner = self.lock();
        let mut items: Vec<Insight> =
            inner.insights.iter().filter(|i| matches(filter, i)).cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = items.len() as i64;
        let items =
            items.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize).collect();
        Ok(InsightPage { items, total })
    }

    async fn insights_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TrendSample>, StorageError> {
        let inner = self.lock();
        Ok(inner
            .insights
            .iter()
            .filter(|i| i.skipped_reason.is_none() && i.created_at >= since)
            .map(|i| TrendSample {
                created_at: i.created_at,
                sentiment: i.sentiment.clone(),
                topics: i.topics.clone(),
                gaps: i.gaps.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_cached(&self, thread_hash: &str) -> Result<Option<Uuid>, StorageError> {
        Ok(self.lock().cache.get(thread_hash).copied())
    }

    async fn set_cached(
        &self,
        thread_hash: &str,
        conversation_id: Uuid,
    ) -> Result<(), StorageError> {
        // First writer wins, matching ON CONFLICT DO NOTHING.
        self.lock().cache.entry(thread_hash.to_owned()).or_insert(conversation_id);
        Ok(())
    }
}
