//! Request/response schemas for conversations, insights, and trends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threadsight_core::normalizer::parse_tabular_created_at;
use threadsight_core::{Insight, NormalizedMessage};
use uuid::Uuid;

const MAX_ID_LEN: usize = 64;
/// Messages per conversation and conversations per bulk request share a cap.
pub const MAX_LIST_LEN: usize = 500;

fn default_true() -> bool {
    true
}

/// Single message in a conversation (tweet, reply, or quote).
#[derive(Debug, Clone, Deserialize)]
pub struct MessageIn {
    pub tweet_id: String,
    pub author_id: String,
    pub text: String,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub quoted_id: Option<String>,
    /// True for customer messages, false for brand/support.
    #[serde(default = "default_true")]
    pub inbound: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Original timestamp string; parsed when `created_at` is absent.
    #[serde(default)]
    pub created_at_raw: Option<String>,
}

fn check_id(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    if value.len() > MAX_ID_LEN {
        return Err(format!("{field} exceeds {MAX_ID_LEN} characters"));
    }
    Ok(())
}

impl MessageIn {
    pub fn validate(&self) -> Result<(), String> {
        check_id("tweet_id", &self.tweet_id)?;
        check_id("author_id", &self.author_id)?;
        if self.text.is_empty() {
            return Err("text must not be empty".to_owned());
        }
        for (field, value) in [
            ("in_reply_to_id", &self.in_reply_to_id),
            ("quoted_id", &self.quoted_id),
            ("created_at_raw", &self.created_at_raw),
        ] {
            if value.as_ref().is_some_and(|v| v.len() > MAX_ID_LEN) {
                return Err(format!("{field} exceeds {MAX_ID_LEN} characters"));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn into_normalized(self) -> NormalizedMessage {
        let created_at = self
            .created_at
            .or_else(|| self.created_at_raw.as_deref().and_then(parse_tabular_created_at));
        NormalizedMessage {
            tweet_id: self.tweet_id,
            author_id: self.author_id,
            text: self.text,
            in_reply_to_id: self.in_reply_to_id.filter(|s| !s.is_empty()),
            quoted_id: self.quoted_id.filter(|s| !s.is_empty()),
            inbound: self.inbound,
            created_at,
            created_at_raw: self.created_at_raw,
        }
    }
}

/// Single conversation: ordered messages (root + replies).
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationIn {
    pub messages: Vec<MessageIn>,
}

impl ConversationIn {
    pub fn validate(&self) -> Result<(), String> {
        if self.messages.is_empty() {
            return Err("messages must not be empty".to_owned());
        }
        if self.messages.len() > MAX_LIST_LEN {
            return Err(format!("at most {MAX_LIST_LEN} messages per conversation"));
        }
        for m in &self.messages {
            m.validate()?;
        }
        Ok(())
    }
}

/// Bulk ingest: up to 500 conversations.
#[derive(Debug, Deserialize)]
pub struct BulkConversationsIn {
    pub conversations: Vec<ConversationIn>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub conversation_id: Uuid,
    pub root_tweet_id: String,
    pub message_count: usize,
    pub enqueued: bool,
}

/// Result for one conversation in bulk ingest. Rejected items carry empty
/// ids.
#[derive(Debug, Serialize)]
pub struct IngestResultItem {
    pub conversation_id: String,
    pub root_tweet_id: String,
    pub message_count: usize,
    pub enqueued: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkIngestResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub results: Vec<IngestResultItem>,
    /// True when the queue filled up mid-bulk and some items were not
    /// enqueued.
    pub backpressure: bool,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct InsightsQuery {
    pub conversation_id: Option<Uuid>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub sentiment: Option<String>,
    pub topic: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct InsightsListResponse {
    pub items: Vec<Insight>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct TrendsQuery {
    #[serde(default)]
    pub window: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TrendVolumePoint {
    pub bucket: String,
    pub count: u64,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct TrendSentimentPoint {
    pub bucket: String,
    pub positive: u64,
    pub negative: u64,
    pub neutral: u64,
    pub other: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct GapCount {
    pub gap: String,
    pub count: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TopicCount {
    pub topic: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct TrendsResponse {
    pub window: String,
    pub volume: Vec<TrendVolumePoint>,
    pub sentiment_drift: Vec<TrendSentimentPoint>,
    pub top_gaps: Vec<GapCount>,
    pub top_topics: Vec<TopicCount>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub queue_depth: usize,
    pub process_id: u32,
}
