use std::sync::Arc;
use std::time::Duration;

use threadsight_core::Settings;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::breaker::{CircuitBreaker, CircuitState};
use crate::client::GrokClient;
use crate::error::LlmError;

fn test_settings(base_url: &str) -> Settings {
    Settings {
        grok_api_key: "test-key".to_owned(),
        grok_base_url: base_url.to_owned(),
        grok_model: "grok-test".to_owned(),
        grok_max_retries: 1,
        grok_timeout_seconds: 5.0,
        ..Settings::default()
    }
}

fn test_breaker(threshold: u32) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(threshold, Duration::from_secs(60)))
}

fn ok_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{ "message": { "content": content, "role": "assistant" } }],
        "usage": {
            "prompt_tokens": 120,
            "completion_tokens": 30,
            "total_tokens": 150,
            "cost_in_usd_ticks": 2500
        }
    })
}

#[tokio::test]
async fn success_on_first_attempt_extracts_insight_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body(
            r#"{"sentiment":"neutral","topics":["greeting"],"gaps":[],"summary":"greeting"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = GrokClient::new(&test_settings(&server.uri()), test_breaker(5)).unwrap();
    let analysis = client.analyze_conversation("[1] hi").await.unwrap();

    assert_eq!(analysis.insight["sentiment"], "neutral");
    assert_eq!(analysis.insight["topics"][0], "greeting");
    assert_eq!(analysis.prompt_tokens, Some(120));
    assert_eq!(analysis.completion_tokens, Some(30));
    assert_eq!(analysis.total_tokens, Some(150));
    assert_eq!(analysis.cost_estimate, Some(0.0025));
}

#[tokio::test]
async fn retries_once_after_429_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("{\"sentiment\":\"positive\"}")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let breaker = test_breaker(5);
    let client = GrokClient::new(&test_settings(&server.uri()), Arc::clone(&breaker)).unwrap();
    let analysis = client.analyze_conversation("[1] hi").await.unwrap();
    assert_eq!(analysis.insight["sentiment"], "positive");
    // The 429 counted against the breaker even though the retry succeeded.
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn non_transient_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let client = GrokClient::new(&test_settings(&server.uri()), test_breaker(5)).unwrap();
    let err = client.analyze_conversation("[1] hi").await.unwrap_err();
    assert!(matches!(err, LlmError::HttpStatus(500)));
    assert_eq!(err.code(), "http_500");
}

#[tokio::test]
async fn empty_choices_is_a_terminal_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = GrokClient::new(&test_settings(&server.uri()), test_breaker(5)).unwrap();
    let err = client.analyze_conversation("[1] hi").await.unwrap_err();
    assert!(matches!(err, LlmError::EmptyResponse));
}

#[tokio::test]
async fn unparseable_content_still_counts_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("sorry, no JSON today")))
        .mount(&server)
        .await;

    let breaker = test_breaker(5);
    let client = GrokClient::new(&test_settings(&server.uri()), Arc::clone(&breaker)).unwrap();
    let analysis = client.analyze_conversation("[1] hi").await.unwrap();
    assert_eq!(analysis.insight["parse_error"], true);
    assert_eq!(analysis.insight["raw"], "sorry, no JSON today");
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn open_breaker_short_circuits_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("{}")))
        .expect(0)
        .mount(&server)
        .await;

    let breaker = test_breaker(1);
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    let client = GrokClient::new(&test_settings(&server.uri()), breaker).unwrap();
    let err = client.analyze_conversation("[1] hi").await.unwrap_err();
    assert!(matches!(err, LlmError::CircuitOpen));
}

#[tokio::test]
async fn repeated_failures_open_the_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .expect(2)
        .mount(&server)
        .await;

    let breaker = test_breaker(2);
    let client = GrokClient::new(&test_settings(&server.uri()), Arc::clone(&breaker)).unwrap();
    assert!(client.analyze_conversation("[1] a").await.is_err());
    assert!(client.analyze_conversation("[1] b").await.is_err());
    assert_eq!(breaker.state(), CircuitState::Open);

    // Third call never reaches the server.
    let err = client.analyze_conversation("[1] c").await.unwrap_err();
    assert!(matches!(err, LlmError::CircuitOpen));
}

#[tokio::test]
async fn missing_api_key_fails_before_any_request() {
    let server = MockServer::start().await;
    let mut settings = test_settings(&server.uri());
    settings.grok_api_key = String::new();
    let client = GrokClient::new(&settings, test_breaker(5)).unwrap();
    let err = client.analyze_conversation("[1] hi").await.unwrap_err();
    assert!(matches!(err, LlmError::MissingApiKey));
}
