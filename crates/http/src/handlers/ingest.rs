//! Conversation ingest: single, bulk (array), and bulk (NDJSON stream).

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use threadsight_core::NormalizedMessage;
use threadsight_core::normalizer::infer_root_tweet_id;
use threadsight_storage::ConversationStore;
use threadsight_service::metrics;
use uuid::Uuid;

use crate::api_error::{ApiError, RETRY_AFTER_SECONDS};
use crate::api_types::{
    BulkConversationsIn, BulkIngestResponse, ConversationIn, IngestResponse, IngestResultItem,
    MessageIn,
};
use crate::AppState;

const MAX_STREAM_LINES: usize = 500;

fn to_normalized(conv: ConversationIn) -> Vec<NormalizedMessage> {
    conv.messages.into_iter().map(MessageIn::into_normalized).collect()
}

/// POST /api/v1/conversations
///
/// Normalize, upsert, and enqueue one conversation for analysis. Returns 503
/// with `Retry-After` when the queue is full, before any work is done.
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConversationIn>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    body.validate().map_err(ApiError::Validation)?;
    if !state.queue.can_accept() {
        metrics::record_backpressure();
        return Err(ApiError::QueueFull);
    }
    let messages = to_normalized(body);
    let root_tweet_id = infer_root_tweet_id(&messages).ok_or(ApiError::NoRoot)?;
    let conversation_id = state.store.upsert_conversation(&messages, &root_tweet_id).await?;
    if !state.queue.enqueue(conversation_id) {
        // Filled up between the advisory check and the enqueue.
        metrics::record_backpressure();
        return Err(ApiError::QueueFull);
    }
    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            conversation_id,
            root_tweet_id,
            message_count: messages.len(),
            enqueued: true,
        }),
    ))
}

/// POST /api/v1/conversations/bulk
///
/// Up to `BULK_MAX_CONVERSATIONS` per request; 207 with per-item results.
/// Hard-rejects with 503 when the queue can accept nothing at all.
pub async fn create_conversations_bulk(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkConversationsIn>,
) -> Result<(StatusCode, Json<BulkIngestResponse>), ApiError> {
    let max_bulk = state.settings.bulk_max_conversations;
    if body.conversations.is_empty() {
        return Err(ApiError::Validation("conversations must not be empty".to_owned()));
    }
    if body.conversations.len() > max_bulk {
        return Err(ApiError::BadRequest(format!("At most {max_bulk} conversations per request.")));
    }
    if !state.queue.can_accept() {
        metrics::record_backpressure();
        return Err(ApiError::QueueFull);
    }

    let mut results: Vec<IngestResultItem> = Vec::new();
    let mut accepted: Vec<(Uuid, String, usize)> = Vec::new();
    let mut rejected = 0_usize;

    for conv in body.conversations {
        let message_count = conv.messages.len();
        if conv.validate().is_err() {
            rejected += 1;
            results.push(IngestResultItem {
                conversation_id: String::new(),
                root_tweet_id: String::new(),
                message_count,
                enqueued: false,
            });
            continue;
        }
        let messages = to_normalized(conv);
        let Some(root_tweet_id) = infer_root_tweet_id(&messages) else {
            rejected += 1;
            results.push(IngestResultItem {
                conversation_id: String::new(),
                root_tweet_id: String::new(),
                message_count,
                enqueued: false,
            });
            continue;
        };
        match state.store.upsert_conversation(&messages, &root_tweet_id).await {
            Ok(id) => accepted.push((id, root_tweet_id, message_count)),
            Err(e) => {
                tracing::error!(%root_tweet_id, error = ?e, "bulk upsert failed");
                rejected += 1;
                results.push(IngestResultItem {
                    conversation_id: String::new(),
                    root_tweet_id,
                    message_count,
                    enqueued: false,
                });
            },
        }
    }

    let mut backpressure = false;
    let accepted_count = accepted.len();
    for (conversation_id, root_tweet_id, message_count) in accepted {
        let enqueued = state.queue.enqueue(conversation_id);
        if !enqueued {
            metrics::record_backpressure();
            backpressure = true;
        }
        results.push(IngestResultItem {
            conversation_id: conversation_id.to_string(),
            root_tweet_id,
            message_count,
            enqueued,
        });
    }

    Ok((
        StatusCode::MULTI_STATUS,
        Json(BulkIngestResponse { accepted: accepted_count, rejected, results, backpressure }),
    ))
}

/// POST /api/v1/conversations/bulk/stream
///
/// Request body is NDJSON, one conversation per line, max 500 lines. Each
/// per-line result is emitted as soon as it is decided; the final line is
/// `{"_summary": {accepted, rejected, backpressure}}`.
pub async fn create_conversations_bulk_stream(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    let input = request.into_body().into_data_stream();
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(ndjson_results(state, input)),
    )
        .into_response()
}

#[derive(Default)]
struct StreamTally {
    accepted: usize,
    rejected: usize,
    backpressure: bool,
}

fn ndjson_line(value: &Value) -> Bytes {
    Bytes::from(format!("{value}\n"))
}

fn ndjson_results(
    state: Arc<AppState>,
    mut input: impl Stream<Item = Result<Bytes, axum::Error>> + Unpin,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    async_stream::stream! {
        if !state.queue.can_accept() {
            metrics::record_backpressure();
            yield Ok(ndjson_line(&serde_json::json!({
                "error": "queue_full",
                "retry_after": RETRY_AFTER_SECONDS
            })));
            return;
        }

        let mut tally = StreamTally::default();
        let mut buffer: Vec<u8> = Vec::new();
        let mut count = 0_usize;

        'read: while let Some(chunk) = input.next().await {
            let Ok(chunk) = chunk else { break };
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let rest = buffer.split_off(pos + 1);
                let mut line = std::mem::replace(&mut buffer, rest);
                line.pop();
                if line.trim_ascii().is_empty() {
                    continue;
                }
                count += 1;
                if count > MAX_STREAM_LINES {
                    break 'read;
                }
                let result = ingest_line(&state, line.trim_ascii(), &mut tally).await;
                yield Ok(ndjson_line(&result));
            }
            if count >= MAX_STREAM_LINES {
                break;
            }
        }

        if !buffer.trim_ascii().is_empty() && count < MAX_STREAM_LINES {
            let result = ingest_line(&state, buffer.trim_ascii(), &mut tally).await;
            yield Ok(ndjson_line(&result));
        }

        yield Ok(ndjson_line(&serde_json::json!({
            "_summary": {
                "accepted": tally.accepted,
                "rejected": tally.rejected,
                "backpressure": tally.backpressure
            }
        })));
    }
}

/// Decide one NDJSON line: parse, validate, upsert, enqueue. Every failure
/// class maps to a tagged result line.
async fn ingest_line(state: &AppState, line: &[u8], tally: &mut StreamTally) -> Value {
    let raw: Value = match serde_json::from_slice(line) {
        Ok(v) => v,
        Err(e) => {
            tally.rejected += 1;
            return serde_json::json!({"error": "invalid_json", "detail": e.to_string()});
        },
    };
    let conv: ConversationIn = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            tally.rejected += 1;
            return serde_json::json!({"error": "validation", "detail": e.to_string()});
        },
    };
    if let Err(detail) = conv.validate() {
        tally.rejected += 1;
        return serde_json::json!({"error": "validation", "detail": detail});
    }
    let messages = to_normalized(conv);
    let Some(root_tweet_id) = infer_root_tweet_id(&messages) else {
        tally.rejected += 1;
        return serde_json::json!({"error": "no_root", "message_count": messages.len()});
    };
    match state.store.upsert_conversation(&messages, &root_tweet_id).await {
        Ok(conversation_id) => {
            let enqueued = state.queue.enqueue(conversation_id);
            if !enqueued {
                metrics::record_backpressure();
                tally.backpressure = true;
            }
            tally.accepted += 1;
            serde_json::json!({
                "conversation_id": conversation_id,
                "root_tweet_id": root_tweet_id,
                "message_count": messages.len(),
                "enqueued": enqueued
            })
        },
        Err(e) => {
            tracing::error!(%root_tweet_id, error = ?e, "stream upsert failed");
            tally.rejected += 1;
            serde_json::json!({"error": "upsert", "root_tweet_id": root_tweet_id})
        },
    }
}
