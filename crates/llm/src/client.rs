//! Grok chat-completions client: prompt construction, the call itself, retry
//! with backoff, and insight JSON parsing.

use std::sync::Arc;

use serde_json::Value;
use threadsight_core::{Settings, strip_json_fence};

use crate::ai_types::{ChatRequest, ChatResponse, Message};
use crate::breaker::CircuitBreaker;
use crate::error::LlmError;

const SYSTEM_PROMPT: &str = r#"You analyze customer support conversation threads from Twitter/X.
Given a full thread (messages in order), output a JSON object with:
- "sentiment": one of "positive", "negative", "neutral", or "mixed"
- "topics": list of short topic strings (e.g. ["billing", "delay", "refund"])
- "gaps": list of service or communication gaps (e.g. "slow response", "no ETA")
- "summary": one short sentence summarizing the conversation

Output only valid JSON, no markdown or extra text."#;

/// Join thread texts into the prompt body: one `[i] text` line per message,
/// 1-indexed.
#[must_use]
pub fn format_thread(texts: &[String]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| format!("[{}] {}", i + 1, t))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parsed model output plus usage accounting.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// The insight object, or `{"raw": …, "parse_error": true}` when the
    /// model returned something that isn't JSON.
    pub insight: Value,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    /// USD estimate derived from `cost_in_usd_ticks` (ticks are 10⁻⁶ USD).
    pub cost_estimate: Option<f64>,
}

/// Client for the Grok chat-completions endpoint.
///
/// Every call consults the shared [`CircuitBreaker`] first; transient
/// failures (429, timeout, transport) are retried with linear backoff up to
/// the configured retry budget.
#[derive(Debug, Clone)]
pub struct GrokClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
    breaker: Arc<CircuitBreaker>,
}

impl GrokClient {
    pub fn new(settings: &Settings, breaker: Arc<CircuitBreaker>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(settings.grok_timeout())
            .build()
            .map_err(|e| LlmError::ClientInit(e.to_string()))?;
        Ok(Self {
            client,
            api_key: settings.grok_api_key.clone(),
            base_url: settings.grok_base_url.clone(),
            model: settings.grok_model.clone(),
            max_retries: settings.grok_max_retries,
            breaker,
        })
    }

    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Analyze one conversation thread.
    ///
    /// # Errors
    /// [`LlmError::CircuitOpen`] when the breaker refuses the call (nothing is
    /// sent and no failure is recorded), otherwise the terminal error after
    /// the retry budget is spent. A 200 with unparseable content is success:
    /// the raw text is preserved in the insight.
    pub async fn analyze_conversation(&self, thread_text: &str) -> Result<Analysis, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message { role: "system".to_owned(), content: SYSTEM_PROMPT.to_owned() },
                Message {
                    role: "user".to_owned(),
                    content: format!("Conversation thread:\n\n{thread_text}"),
                },
            ],
            stream: false,
            temperature: 0.0,
        };

        let mut attempt = 0_u32;
        loop {
            if !self.breaker.can_call() {
                return Err(LlmError::CircuitOpen);
            }
            match self.try_once(&url, &request).await {
                Ok(analysis) => return Ok(analysis),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    tracing::warn!(error = %err, attempt, "grok call failed, retrying");
                    tokio::time::sleep(err.backoff(attempt)).await;
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_once(&self, url: &str, request: &ChatRequest) -> Result<Analysis, LlmError> {
        let response = match self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.breaker.record_failure();
                return Err(if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Transport(e.to_string())
                });
            },
        };

        let status = response.status();
        if status.as_u16() == 429 {
            self.breaker.record_failure();
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            self.breaker.record_failure();
            return Err(LlmError::HttpStatus(status.as_u16()));
        }

        let data: ChatResponse = match response.json().await {
            Ok(d) => d,
            Err(e) => {
                self.breaker.record_failure();
                return Err(LlmError::Transport(e.to_string()));
            },
        };
        let Some(choice) = data.choices.into_iter().next() else {
            self.breaker.record_failure();
            return Err(LlmError::EmptyResponse);
        };

        let content = choice.message.content.unwrap_or_default();
        let usage = data.usage.unwrap_or_default();
        self.breaker.record_success();
        Ok(Analysis {
            insight: parse_insight_json(&content),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost_estimate: usage.cost_in_usd_ticks.map(|ticks| ticks as f64 / 1_000_000.0),
        })
    }
}

/// Parse assistant content as JSON after stripping a surrounding code fence.
/// Non-JSON content is preserved as `{"raw": …, "parse_error": true}`.
fn parse_insight_json(content: &str) -> Value {
    if content.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(strip_json_fence(content)).unwrap_or_else(|_| {
        serde_json::json!({ "raw": content, "parse_error": true })
    })
}
