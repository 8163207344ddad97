//! The analysis worker: drains the queue and runs each conversation through
//! pre-filter → cache → pacing → Grok → store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use threadsight_core::{NewInsight, Settings, pre_filter, thread_hash};
use threadsight_llm::{GrokClient, format_thread};
use threadsight_storage::{CacheStore, ConversationStore, InsightStore, StorageError, Store};
use tokio::time::Instant;
use uuid::Uuid;

use crate::metrics;
use crate::pacer::PaceController;
use crate::queue::WorkQueue;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub min_messages: usize,
    pub min_chars: usize,
    pub poll_interval: Duration,
}

impl WorkerConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            min_messages: settings.pre_filter_min_messages,
            min_chars: settings.pre_filter_min_total_chars,
            poll_interval: settings.worker_poll_interval(),
        }
    }
}

pub struct Worker<S: ?Sized> {
    store: Arc<S>,
    queue: Arc<WorkQueue>,
    pacer: Arc<PaceController>,
    llm: GrokClient,
    config: WorkerConfig,
}

impl<S: Store + ?Sized> Worker<S> {
    pub fn new(
        store: Arc<S>,
        queue: Arc<WorkQueue>,
        pacer: Arc<PaceController>,
        llm: GrokClient,
        config: WorkerConfig,
    ) -> Self {
        Self { store, queue, pacer, llm, config }
    }

    /// Main loop: dequeue, process, repeat. Runs until the owning task is
    /// cancelled; cancellation lands on the `dequeue` suspension point, so an
    /// abort never interrupts a store write.
    pub async fn run(&self) {
        tracing::info!("worker loop started");
        loop {
            if let Some(conversation_id) = self.queue.dequeue(self.config.poll_interval).await {
                if let Err(e) = self.process_one(conversation_id).await {
                    tracing::error!(%conversation_id, error = ?e, "processing failed");
                }
            }
            metrics::set_queue_depth(self.queue.depth());
        }
    }

    /// Process a single conversation end to end. Idempotent against duplicate
    /// delivery: an existing insight short-circuits before any Grok call, and
    /// insight/cache inserts ignore conflicts.
    pub async fn process_one(&self, conversation_id: Uuid) -> anyhow::Result<()> {
        let Some(thread) = self.store.load_thread(conversation_id).await? else {
            tracing::warn!(%conversation_id, "conversation not found");
            return Ok(());
        };
        if thread.texts.is_empty() {
            tracing::warn!(%conversation_id, "empty thread");
            return Ok(());
        }

        let decision =
            pre_filter::check_thread(&thread.texts, self.config.min_messages, self.config.min_chars);
        if !decision.interesting {
            if self.store.get_insight(conversation_id).await?.is_none() {
                tracing::debug!(%conversation_id, reason = %decision.reason, "pre-filter skip");
                self.insert_ignoring_duplicate(conversation_id, NewInsight::skipped(decision.reason))
                    .await?;
            }
            return Ok(());
        }

        let hash = thread_hash(&thread.texts);
        if let Some(cached_id) = self.store.get_cached(&hash).await? {
            if cached_id != conversation_id {
                if let Some(other) = self.store.get_insight(cached_id).await? {
                    if !other.is_skipped() {
                        tracing::debug!(%conversation_id, source = %cached_id, "cache hit, reusing insight");
                        let copy = NewInsight {
                            grok_output: other.grok_output,
                            sentiment: other.sentiment,
                            topics: other.topics,
                            gaps: other.gaps,
                            skipped_reason: Some("cache_hit".to_owned()),
                            ..NewInsight::default()
                        };
                        self.insert_ignoring_duplicate(conversation_id, copy).await?;
                        return Ok(());
                    }
                }
            }
        }

        if self.store.get_insight(conversation_id).await?.is_some() {
            self.store.set_cached(&hash, conversation_id).await?;
            return Ok(());
        }

        self.pacer.acquire().await;
        let start = Instant::now();
        // No store transaction is open here; the call can take the full
        // configured timeout.
        let analysis = match self.llm.analyze_conversation(&format_thread(&thread.texts)).await {
            Ok(a) => a,
            Err(err) => {
                self.pacer.record_failure();
                metrics::record_grok_error();
                tracing::warn!(%conversation_id, code = %err.code(), "grok analysis failed, dropping item");
                return Ok(());
            },
        };
        self.pacer
            .record_success(start.elapsed(), u64::from(analysis.total_tokens.unwrap_or(0)));
        metrics::record_grok_success(
            u64::from(analysis.total_tokens.unwrap_or(0)),
            analysis.cost_estimate,
        );

        let insight = NewInsight {
            sentiment: analysis
                .insight
                .get("sentiment")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
            topics: string_list(analysis.insight.get("topics")),
            gaps: string_list(analysis.insight.get("gaps")),
            prompt_tokens: analysis.prompt_tokens.map(|v| v as i32),
            completion_tokens: analysis.completion_tokens.map(|v| v as i32),
            cost_estimate: analysis.cost_estimate,
            grok_output: analysis.insight,
            skipped_reason: None,
        };
        self.insert_ignoring_duplicate(conversation_id, insight).await?;
        self.store.set_cached(&hash, conversation_id).await?;
        Ok(())
    }

    async fn insert_ignoring_duplicate(
        &self,
        conversation_id: Uuid,
        insight: NewInsight,
    ) -> Result<(), StorageError> {
        match self.store.insert_insight(conversation_id, insight).await {
            Ok(_) | Err(StorageError::InsightExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Accept only JSON lists, keeping their string items.
fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(ToOwned::to_owned).collect())
}
