//! Domain records for conversations, their messages, and analysis insights.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Canonical message record after normalization.
///
/// `created_at` is `None` when the source carried no parseable timestamp; the
/// original string, if any, survives in `created_at_raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub tweet_id: String,
    pub author_id: String,
    pub text: String,
    pub in_reply_to_id: Option<String>,
    pub quoted_id: Option<String>,
    pub inbound: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub created_at_raw: Option<String>,
}

/// One conversation thread: a root tweet plus all replies that reach it.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub root_tweet_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored tweet (root or reply) belonging to one conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Tweet {
    pub id: String,
    pub conversation_id: Uuid,
    pub author_id: String,
    pub text: String,
    pub in_reply_to_id: Option<String>,
    pub quoted_id: Option<String>,
    pub inbound: bool,
    pub created_at: DateTime<Utc>,
    pub created_at_raw: Option<String>,
}

/// Analysis result for one conversation.
///
/// Either a real Grok-derived insight, or — when `skipped_reason` is set — a
/// marker recording why no model call was made (pre-filter miss or cache
/// reuse). At most one insight exists per conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub grok_output: Value,
    pub sentiment: Option<String>,
    pub topics: Option<Vec<String>>,
    pub gaps: Option<Vec<String>>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub cost_estimate: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub skipped_reason: Option<String>,
}

impl Insight {
    /// Whether this row records a skipped analysis rather than a real one.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skipped_reason.is_some()
    }
}

/// Insert payload for a new insight; the store assigns id and timestamp.
#[derive(Debug, Clone, Default)]
pub struct NewInsight {
    pub grok_output: Value,
    pub sentiment: Option<String>,
    pub topics: Option<Vec<String>>,
    pub gaps: Option<Vec<String>>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub cost_estimate: Option<f64>,
    pub skipped_reason: Option<String>,
}

impl NewInsight {
    /// Marker row for a conversation the pipeline decided not to analyze.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            grok_output: Value::Object(serde_json::Map::new()),
            skipped_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}
