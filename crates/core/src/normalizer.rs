//! Normalize external message shapes into [`NormalizedMessage`] records and
//! infer the thread root.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::thread::NormalizedMessage;

/// Fixed timestamp format used by the tabular export,
/// e.g. `Tue Oct 31 22:10:47 +0000 2017`.
pub const TABULAR_DATE_FMT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Placeholder for rows whose text column is empty; message text is never empty.
pub const NO_TEXT_PLACEHOLDER: &str = "(no text)";

/// One row of the tabular support-tweets export.
#[derive(Debug, Clone, Deserialize)]
pub struct TabularRow {
    pub tweet_id: String,
    pub author_id: String,
    #[serde(default)]
    pub inbound: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub in_response_to_tweet_id: String,
}

/// Parse a tabular-format timestamp; `None` on empty input or format mismatch.
#[must_use]
pub fn parse_tabular_created_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_str(raw, TABULAR_DATE_FMT).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Truthy token set for string-sourced booleans.
#[must_use]
pub fn truthy(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Convert one tabular row into a canonical message.
#[must_use]
pub fn tabular_row_to_message(row: &TabularRow) -> NormalizedMessage {
    let created_at = parse_tabular_created_at(&row.created_at);
    let created_at_raw = {
        let raw = row.created_at.trim();
        (!raw.is_empty()).then(|| raw.to_owned())
    };
    let text = row.text.trim();
    let in_reply_to = row.in_response_to_tweet_id.trim();
    NormalizedMessage {
        tweet_id: row.tweet_id.trim().to_owned(),
        author_id: row.author_id.trim().to_owned(),
        text: if text.is_empty() { NO_TEXT_PLACEHOLDER.to_owned() } else { text.to_owned() },
        in_reply_to_id: (!in_reply_to.is_empty()).then(|| in_reply_to.to_owned()),
        quoted_id: None,
        inbound: truthy(&row.inbound),
        created_at,
        created_at_raw,
    }
}

/// Infer the root tweet id of a message list.
///
/// The root is the first message whose id is referenced by no
/// `in_reply_to_id` in the list. If every message is a reply to something in
/// the list (pathological input), the first message wins.
#[must_use]
pub fn infer_root_tweet_id(messages: &[NormalizedMessage]) -> Option<String> {
    let reply_targets: std::collections::HashSet<&str> =
        messages.iter().filter_map(|m| m.in_reply_to_id.as_deref()).collect();
    for m in messages {
        if !m.tweet_id.is_empty() && !reply_targets.contains(m.tweet_id.as_str()) {
            return Some(m.tweet_id.clone());
        }
    }
    messages.first().map(|m| m.tweet_id.clone())
}
