use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use threadsight_core::{NewInsight, NormalizedMessage, Settings};
use threadsight_service::WorkQueue;
use threadsight_storage::{ConversationStore, MemoryStore, Store};
use tower::ServiceExt;

use crate::{AppState, create_router};

struct TestApp {
    store: Arc<MemoryStore>,
    queue: Arc<WorkQueue>,
    router: Router,
}

fn test_app(queue_capacity: usize, settings: Settings) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(WorkQueue::new(queue_capacity));
    let state = Arc::new(AppState::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&queue),
        settings,
    ));
    TestApp { store, queue, router: create_router(state) }
}

fn default_app() -> TestApp {
    test_app(100, Settings::default())
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

fn two_message_conversation(root: &str, reply: &str) -> Value {
    json!({
        "messages": [
            {"tweet_id": root, "author_id": "cust", "text": "Hi"},
            {"tweet_id": reply, "author_id": "brand", "text": "Hello", "in_reply_to_id": root, "inbound": false}
        ]
    })
}

fn normalized(id: &str, text: &str) -> NormalizedMessage {
    NormalizedMessage {
        tweet_id: id.to_owned(),
        author_id: "cust".to_owned(),
        text: text.to_owned(),
        in_reply_to_id: None,
        quoted_id: None,
        inbound: true,
        created_at: None,
        created_at_raw: None,
    }
}

#[tokio::test]
async fn single_ingest_returns_201_and_enqueues() {
    let app = default_app();
    let response = app
        .router
        .clone()
        .oneshot(post_json("/api/v1/conversations", &two_message_conversation("A", "B")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["root_tweet_id"], "A");
    assert_eq!(body["message_count"], 2);
    assert_eq!(body["enqueued"], true);
    assert_eq!(app.queue.depth(), 1);
}

#[tokio::test]
async fn ingest_without_messages_is_unprocessable() {
    let app = default_app();
    let response = app
        .router
        .clone()
        .oneshot(post_json("/api/v1/conversations", &json!({"messages": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn full_queue_returns_503_with_retry_after() {
    let app = test_app(2, Settings::default());
    for (root, reply) in [("A", "B"), ("C", "D")] {
        let response = app
            .router
            .clone()
            .oneshot(post_json("/api/v1/conversations", &two_message_conversation(root, reply)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    let response = app
        .router
        .clone()
        .oneshot(post_json("/api/v1/conversations", &two_message_conversation("E", "F")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers().get("retry-after").unwrap(), "60");
}

#[tokio::test]
async fn bulk_reports_per_item_results() {
    let app = default_app();
    let body = json!({
        "conversations": [
            two_message_conversation("A", "B"),
            {"messages": [{"tweet_id": "X", "author_id": "cust", "text": ""}]},
            two_message_conversation("C", "D"),
        ]
    });
    let response =
        app.router.clone().oneshot(post_json("/api/v1/conversations/bulk", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let body = body_json(response).await;
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["rejected"], 1);
    assert_eq!(body["backpressure"], false);
    assert_eq!(body["results"].as_array().unwrap().len(), 3);
    assert_eq!(app.queue.depth(), 2);
}

#[tokio::test]
async fn bulk_over_the_cap_is_a_bad_request() {
    let settings = Settings { bulk_max_conversations: 2, ..Settings::default() };
    let app = test_app(100, settings);
    let body = json!({
        "conversations": [
            two_message_conversation("A", "B"),
            two_message_conversation("C", "D"),
            two_message_conversation("E", "F"),
        ]
    });
    let response =
        app.router.clone().oneshot(post_json("/api/v1/conversations/bulk", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn streaming_ingest_emits_one_line_per_input_plus_summary() {
    let app = default_app();
    let body = format!(
        "{}\n{}\nnot json\n",
        two_message_conversation("A", "B"),
        two_message_conversation("C", "D"),
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/conversations/bulk/stream")
        .header("content-type", "application/x-ndjson")
        .body(Body::from(body))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/x-ndjson"
    );

    let text = body_text(response).await;
    let lines: Vec<Value> =
        text.lines().map(|l| serde_json::from_str(l).expect("ndjson line")).collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["root_tweet_id"], "A");
    assert_eq!(lines[0]["enqueued"], true);
    assert_eq!(lines[2]["error"], "invalid_json");
    let summary = &lines[3]["_summary"];
    assert_eq!(summary["accepted"], 2);
    assert_eq!(summary["rejected"], 1);
    assert_eq!(summary["backpressure"], false);
    assert_eq!(app.queue.depth(), 2);
}

#[tokio::test]
async fn streaming_ingest_reports_queue_full_as_a_single_line() {
    let app = test_app(1, Settings::default());
    assert!(app.queue.enqueue(uuid::Uuid::new_v4()));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/conversations/bulk/stream")
        .body(Body::from(format!("{}\n", two_message_conversation("A", "B"))))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    let text = body_text(response).await;
    let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["error"], "queue_full");
    assert_eq!(lines[0]["retry_after"], 60);
}

#[tokio::test]
async fn insights_listing_filters_and_hides_skipped_rows() {
    let app = default_app();
    let c1 = app.store.upsert_conversation(&[normalized("A", "hi")], "A").await.unwrap();
    let c2 = app.store.upsert_conversation(&[normalized("B", "yo")], "B").await.unwrap();
    let c3 = app.store.upsert_conversation(&[normalized("C", "hm")], "C").await.unwrap();
    app.store
        .insert_insight_at(
            c1,
            NewInsight {
                sentiment: Some("negative".to_owned()),
                topics: Some(vec!["billing".to_owned()]),
                ..NewInsight::default()
            },
            Utc::now(),
        )
        .unwrap();
    app.store
        .insert_insight_at(
            c2,
            NewInsight { sentiment: Some("positive".to_owned()), ..NewInsight::default() },
            Utc::now(),
        )
        .unwrap();
    app.store
        .insert_insight_at(c3, NewInsight::skipped("message_count_1_lt_2"), Utc::now())
        .unwrap();

    let response = app.router.clone().oneshot(get("/api/v1/insights")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 2);

    let response = app
        .router
        .clone()
        .oneshot(get("/api/v1/insights?sentiment=negative"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["conversation_id"], json!(c1));

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/api/v1/insights?conversation_id={c3}")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn trends_cover_only_the_requested_window() {
    let app = default_app();
    let c1 = app.store.upsert_conversation(&[normalized("A", "hi")], "A").await.unwrap();
    let c2 = app.store.upsert_conversation(&[normalized("B", "yo")], "B").await.unwrap();
    let c3 = app.store.upsert_conversation(&[normalized("C", "hm")], "C").await.unwrap();
    app.store
        .insert_insight_at(
            c1,
            NewInsight {
                sentiment: Some("positive".to_owned()),
                topics: Some(vec!["billing".to_owned()]),
                gaps: Some(vec!["no ETA".to_owned()]),
                ..NewInsight::default()
            },
            Utc::now() - Duration::hours(1),
        )
        .unwrap();
    app.store
        .insert_insight_at(
            c2,
            NewInsight { sentiment: Some("negative".to_owned()), ..NewInsight::default() },
            Utc::now() - Duration::hours(2),
        )
        .unwrap();
    // Outside the 7-day window.
    app.store
        .insert_insight_at(
            c3,
            NewInsight { sentiment: Some("negative".to_owned()), ..NewInsight::default() },
            Utc::now() - Duration::days(10),
        )
        .unwrap();

    let response = app.router.clone().oneshot(get("/api/v1/trends?window=7d")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["window"], "7d");
    let total: u64 =
        body["volume"].as_array().unwrap().iter().map(|p| p["count"].as_u64().unwrap()).sum();
    assert_eq!(total, 2);
    assert_eq!(body["top_topics"][0]["topic"], "billing");
    assert_eq!(body["top_gaps"][0]["gap"], "no ETA");
}

#[tokio::test]
async fn rate_limit_returns_429_after_budget_is_spent() {
    let settings = Settings { rate_limit_rpm: 2, ..Settings::default() };
    let app = test_app(100, settings);
    for _ in 0..2 {
        let response = app.router.clone().oneshot(get("/api/v1/insights")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.router.clone().oneshot(get("/api/v1/insights")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get("retry-after").unwrap(), "60");

    // Operational endpoints are exempt.
    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_reports_queue_depth_and_process_id() {
    let app = default_app();
    app.queue.enqueue(uuid::Uuid::new_v4());
    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queue_depth"], 1);
    assert_eq!(body["process_id"], u64::from(std::process::id()));
}
