//! Integration tests for the HTTP client against a mock backend.
//!
//! These tests run the real reqwest transport against an in-process axum
//! server that mimics the DailyStack backend: readiness polling, challenge
//! loading, streamed answers split across HTTP chunks, and credentials.

use std::collections::VecDeque;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use dailystack_client::{
    ApiClient, Backend, ChatRole, ClientError, Controller, Credentials, ExplanationOutcome,
    PollPolicy, Readiness, SendOutcome, Session, CHAT_APOLOGY,
};
use futures::StreamExt;
use serde_json::{json, Value};

// ============================================================================
// Mock backend
// ============================================================================

/// A scripted reply: HTTP status plus JSON body.
#[derive(Clone)]
struct Reply {
    status: StatusCode,
    body: Value,
}

impl Reply {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    fn status(status: StatusCode) -> Self {
        Self {
            status,
            body: json!({"error": "scripted failure"}),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Default)]
struct Calls {
    status: u32,
    scenario: u32,
    current_flashcard: u32,
    next_flashcard: u32,
    chat_history: u32,
}

struct Mock {
    /// Status replies in order; the last one repeats.
    statuses: VecDeque<Value>,
    scenario: Reply,
    current_flashcard: Reply,
    next_flashcard: Reply,
    chat_history: Reply,
    auth: Reply,
    save_status: StatusCode,
    /// Raw chunks of the answer body, sent with a pause between them.
    answer_chunks: Vec<Vec<u8>>,
    ask_status: StatusCode,
    asked: Vec<Value>,
    saved: Vec<Value>,
    calls: Calls,
}

impl Default for Mock {
    fn default() -> Self {
        Self {
            statuses: VecDeque::new(),
            scenario: Reply::ok(json!({})),
            current_flashcard: Reply::ok(json!({})),
            next_flashcard: Reply::ok(json!({"status": "no flashcards"})),
            chat_history: Reply::ok(json!([])),
            auth: Reply::ok(json!({"authenticated": true})),
            save_status: StatusCode::OK,
            answer_chunks: Vec::new(),
            ask_status: StatusCode::OK,
            asked: Vec::new(),
            saved: Vec::new(),
            calls: Calls::default(),
        }
    }
}

type Shared = Arc<Mutex<Mock>>;

fn lock(mock: &Shared) -> std::sync::MutexGuard<'_, Mock> {
    mock.lock().expect("Mock state poisoned")
}

async fn status(State(mock): State<Shared>) -> Json<Value> {
    let mut mock = lock(&mock);
    mock.calls.status += 1;
    let reply = if mock.statuses.len() > 1 {
        mock.statuses.pop_front()
    } else {
        mock.statuses.front().cloned()
    };
    Json(reply.unwrap_or_else(|| json!({"loading": true, "has_data": false})))
}

async fn scenario(State(mock): State<Shared>) -> Reply {
    let mut mock = lock(&mock);
    mock.calls.scenario += 1;
    mock.scenario.clone()
}

async fn current_flashcard(State(mock): State<Shared>) -> Reply {
    let mut mock = lock(&mock);
    mock.calls.current_flashcard += 1;
    mock.current_flashcard.clone()
}

async fn next_flashcard(State(mock): State<Shared>) -> Reply {
    let mut mock = lock(&mock);
    mock.calls.next_flashcard += 1;
    mock.next_flashcard.clone()
}

async fn chat_history(State(mock): State<Shared>) -> Reply {
    let mut mock = lock(&mock);
    mock.calls.chat_history += 1;
    mock.chat_history.clone()
}

async fn check_auth(State(mock): State<Shared>) -> Reply {
    lock(&mock).auth.clone()
}

async fn save_credentials(State(mock): State<Shared>, Json(body): Json<Value>) -> StatusCode {
    let mut mock = lock(&mock);
    mock.saved.push(body);
    mock.save_status
}

async fn ask_llm(State(mock): State<Shared>, Json(body): Json<Value>) -> Response {
    let (status, chunks) = {
        let mut mock = lock(&mock);
        mock.asked.push(body);
        (mock.ask_status, mock.answer_chunks.clone())
    };

    if !status.is_success() {
        return status.into_response();
    }

    // The pause keeps every chunk in its own read on the client side.
    let stream = futures::stream::iter(chunks).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, std::io::Error>(Bytes::from(chunk))
    });

    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(stream),
    )
        .into_response()
}

fn router(mock: Shared) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/scenario", get(scenario))
        .route("/api/flashcard/current", get(current_flashcard))
        .route("/api/flashcard/next", post(next_flashcard))
        .route("/api/chat/history", get(chat_history))
        .route("/api/ask-llm", post(ask_llm))
        .route("/check-auth", get(check_auth))
        .route("/save-credentials", post(save_credentials))
        .with_state(mock)
}

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Spawns the mock backend and returns its base URL.
async fn spawn_test_server(mock: Mock) -> (String, Shared, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let base_url = format!("http://{addr}");

    let mock = Arc::new(Mutex::new(mock));
    let app = router(Arc::clone(&mock));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (base_url, mock, handle)
}

fn fast_policy(max_attempts: u32) -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(10),
        max_attempts,
    }
}

fn controller(base_url: &str, max_attempts: u32) -> Controller<ApiClient> {
    let client = ApiClient::new(base_url, Duration::from_secs(2), Duration::from_secs(5))
        .expect("Failed to build client");
    Controller::new(Arc::new(client), Session::default(), fast_policy(max_attempts))
}

fn loading() -> Value {
    json!({"loading": true, "has_data": false})
}

fn ready() -> Value {
    json!({"loading": false, "has_data": true})
}

fn sample_scenario() -> Value {
    json!({
        "title": "Design a URL shortener",
        "problem_description": "Millions of redirects per day.",
        "architectural_overview": "Stateless API in front of a key-value store."
    })
}

fn sample_flashcard() -> Value {
    json!({
        "question": "How are short codes generated?",
        "short_answer": "Base62 encoding of a counter",
        "category": "Encoding"
    })
}

/// Encodes answer fragments as SSE data lines.
fn sse_body(fragments: &[&str]) -> Vec<u8> {
    fragments
        .iter()
        .map(|fragment| format!("data: {}\n\n", json!({ "answer": fragment })))
        .collect::<String>()
        .into_bytes()
}

/// Splits `body` at the given byte offsets.
fn split_at(body: &[u8], offsets: &[usize]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for &offset in offsets {
        chunks.push(body[start..offset].to_vec());
        start = offset;
    }
    chunks.push(body[start..].to_vec());
    chunks
}

// ============================================================================
// Readiness Tests
// ============================================================================

/// Tests that the challenge is fetched exactly once after the status turns ready.
#[tokio::test]
async fn test_await_ready_loads_challenge_once() {
    let mock = Mock {
        statuses: VecDeque::from([loading(), loading(), ready()]),
        scenario: Reply::ok(sample_scenario()),
        current_flashcard: Reply::ok(sample_flashcard()),
        chat_history: Reply::ok(json!([
            {"role": "user", "content": "What is Base62?"},
            {"role": "bot", "content": "Digits plus both letter cases."}
        ])),
        ..Mock::default()
    };
    let (base_url, mock, _handle) = spawn_test_server(mock).await;
    let controller = controller(&base_url, 10);

    let readiness = controller.await_ready().await;
    assert_eq!(readiness, Readiness::Ready);

    {
        let mock = lock(&mock);
        assert_eq!(mock.calls.status, 3);
        assert_eq!(mock.calls.scenario, 1);
        assert_eq!(mock.calls.current_flashcard, 1);
        assert_eq!(mock.calls.chat_history, 1);
    }

    let state = controller.session().snapshot().await;
    assert!(!state.loading);
    assert!(state.error.is_none());

    let scenario = state.scenario.expect("Scenario should be loaded");
    assert_eq!(scenario.title, "Design a URL shortener");
    assert_eq!(scenario.description, "Millions of redirects per day.");

    let flashcard = state.flashcard.expect("Flashcard should be loaded");
    assert_eq!(flashcard.answer, "Base62 encoding of a counter");
    assert_eq!(flashcard.category, "Encoding");

    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1].role, ChatRole::Bot);
}

/// Tests that polling stops after the configured number of attempts.
#[tokio::test]
async fn test_await_ready_times_out_after_budget() {
    let mock = Mock {
        statuses: VecDeque::from([loading()]),
        ..Mock::default()
    };
    let (base_url, mock, _handle) = spawn_test_server(mock).await;
    let controller = controller(&base_url, 3);

    let readiness = controller.await_ready().await;
    assert_eq!(readiness, Readiness::TimedOut { attempts: 3 });

    let mock = lock(&mock);
    assert_eq!(mock.calls.status, 3);
    assert_eq!(mock.calls.scenario, 0);
    drop(mock);

    let state = controller.session().snapshot().await;
    assert!(!state.loading);
    assert!(state.error.is_some());
}

/// Tests that a backend error surfaces in the session without fetching.
#[tokio::test]
async fn test_await_ready_reports_backend_error() {
    let mock = Mock {
        statuses: VecDeque::from([
            loading(),
            json!({"loading": false, "has_data": false, "error": "LLM quota exceeded"}),
        ]),
        ..Mock::default()
    };
    let (base_url, mock, _handle) = spawn_test_server(mock).await;
    let controller = controller(&base_url, 10);

    let readiness = controller.await_ready().await;
    assert_eq!(
        readiness,
        Readiness::Failed {
            reason: "LLM quota exceeded".to_string()
        }
    );
    assert_eq!(lock(&mock).calls.scenario, 0);

    let state = controller.session().snapshot().await;
    let error = state.error.expect("Error should be shown");
    assert!(error.contains("LLM quota exceeded"), "got: {error}");
}

/// Tests that an unreachable backend counts as still loading.
#[tokio::test]
async fn test_unreachable_backend_times_out() {
    let base_url = format!("http://127.0.0.1:{}", find_available_port());
    let controller = controller(&base_url, 2);

    let readiness = controller.await_ready().await;
    assert_eq!(readiness, Readiness::TimedOut { attempts: 2 });
}

// ============================================================================
// Challenge Tests
// ============================================================================

/// Tests that a failing endpoint produces a readable error banner.
#[tokio::test]
async fn test_load_failure_names_endpoint_and_status() {
    let mock = Mock {
        scenario: Reply::status(StatusCode::SERVICE_UNAVAILABLE),
        current_flashcard: Reply::ok(sample_flashcard()),
        ..Mock::default()
    };
    let (base_url, _mock, _handle) = spawn_test_server(mock).await;
    let controller = controller(&base_url, 1);

    let error = controller
        .load_daily_challenge()
        .await
        .expect_err("Scenario failure should fail the load");
    assert!(matches!(error, ClientError::RequestFailed { status: 503, .. }));
    assert_eq!(error.to_string(), "Failed to fetch scenario (HTTP 503)");

    let state = controller.session().snapshot().await;
    assert_eq!(state.error.as_deref(), Some("Failed to fetch scenario (HTTP 503)"));
    assert!(!state.loading);
}

/// Tests that an empty scenario object is treated as no scenario.
#[tokio::test]
async fn test_empty_payloads_are_none() {
    let (base_url, _mock, _handle) = spawn_test_server(Mock::default()).await;
    let client = ApiClient::new(&base_url, Duration::from_secs(2), Duration::from_secs(5))
        .expect("Failed to build client");

    assert!(client.scenario().await.expect("Scenario request").is_none());
    assert!(client
        .current_flashcard()
        .await
        .expect("Flashcard request")
        .is_none());
    assert!(client
        .next_flashcard()
        .await
        .expect("Next flashcard request")
        .is_none());
}

/// Tests that advancing replaces the card and hides the answer again.
#[tokio::test]
async fn test_next_card_replaces_flashcard() {
    let mock = Mock {
        statuses: VecDeque::from([ready()]),
        scenario: Reply::ok(sample_scenario()),
        current_flashcard: Reply::ok(sample_flashcard()),
        next_flashcard: Reply::ok(json!({
            "question": "Where do redirects get cached?",
            "answer": "In a CDN edge cache"
        })),
        ..Mock::default()
    };
    let (base_url, mock, _handle) = spawn_test_server(mock).await;
    let controller = controller(&base_url, 3);
    assert!(controller.await_ready().await.is_ready());

    // Reveal without explaining; the request is dropped.
    let _ = controller.toggle_answer().await;
    assert!(controller.session().snapshot().await.answer_revealed);

    controller.next_card().await.expect("Next card should load");

    let state = controller.session().snapshot().await;
    let flashcard = state.flashcard.expect("Flashcard should be loaded");
    assert_eq!(flashcard.question, "Where do redirects get cached?");
    assert!(!state.answer_revealed);
    assert!(!state.loading);

    let mock = lock(&mock);
    assert_eq!(mock.calls.next_flashcard, 1);
    assert_eq!(mock.calls.chat_history, 2);
}

// ============================================================================
// Streaming Tests
// ============================================================================

/// Tests that an explanation split mid-line and mid-character streams intact.
#[tokio::test]
async fn test_explanation_survives_arbitrary_chunking() {
    let body = sse_body(&["Counters are ", "encoded in Base62 ✓"]);
    let check_mark = body
        .windows(3)
        .position(|w| w == "✓".as_bytes())
        .expect("Body contains the check mark");
    // Mid-prefix, mid-JSON and inside the three-byte check mark.
    let chunks = split_at(&body, &[3, 20, check_mark + 1, check_mark + 2]);

    let mock = Mock {
        statuses: VecDeque::from([ready()]),
        scenario: Reply::ok(sample_scenario()),
        current_flashcard: Reply::ok(sample_flashcard()),
        answer_chunks: chunks,
        ..Mock::default()
    };
    let (base_url, mock, _handle) = spawn_test_server(mock).await;
    let controller = controller(&base_url, 3);
    assert!(controller.await_ready().await.is_ready());

    let request = controller
        .toggle_answer()
        .await
        .expect("First reveal should request an explanation");
    assert_eq!(controller.explain(request).await, ExplanationOutcome::Completed);

    let state = controller.session().snapshot().await;
    let last = state.messages.last().expect("Explanation message");
    assert_eq!(last.role, ChatRole::Bot);
    assert_eq!(last.content, "Counters are encoded in Base62 ✓");
    assert!(!state.generating);

    let mock = lock(&mock);
    assert_eq!(mock.asked.len(), 1);
    assert_eq!(mock.asked[0]["hidden"], json!(true));
    let question = mock.asked[0]["question"].as_str().expect("Question string");
    assert!(question.contains("How are short codes generated?"));
    assert!(question.contains("Design a URL shortener"));
}

/// Tests that a visible chat message is posted without the hidden flag.
#[tokio::test]
async fn test_chat_send_streams_answer() {
    let mock = Mock {
        answer_chunks: split_at(&sse_body(&["Use ", "a counter."]), &[7]),
        ..Mock::default()
    };
    let (base_url, mock, _handle) = spawn_test_server(mock).await;
    let controller = controller(&base_url, 1);

    assert_eq!(controller.send("  why base62?  ").await, SendOutcome::Answered);

    let state = controller.session().snapshot().await;
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[0].role, ChatRole::User);
    assert_eq!(state.messages[0].content, "why base62?");
    assert_eq!(state.messages[1].content, "Use a counter.");

    assert_eq!(lock(&mock).asked, vec![json!({"question": "why base62?"})]);
}

/// Tests that a rejected chat request shows the apology.
#[tokio::test]
async fn test_chat_rejected_shows_apology() {
    let mock = Mock {
        ask_status: StatusCode::INTERNAL_SERVER_ERROR,
        ..Mock::default()
    };
    let (base_url, _mock, _handle) = spawn_test_server(mock).await;
    let controller = controller(&base_url, 1);

    assert_eq!(controller.send("hello").await, SendOutcome::Failed);

    let state = controller.session().snapshot().await;
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1].content, CHAT_APOLOGY);
}

/// Tests that an error payload in the stream replaces the partial answer.
#[tokio::test]
async fn test_stream_error_payload_replaces_answer() {
    let mut body = sse_body(&["partial "]);
    body.extend_from_slice(b"data: {\"error\": \"model overloaded\"}\n\n");

    let mock = Mock {
        answer_chunks: vec![body],
        ..Mock::default()
    };
    let (base_url, _mock, _handle) = spawn_test_server(mock).await;
    let controller = controller(&base_url, 1);

    controller.send("hello").await;

    let state = controller.session().snapshot().await;
    assert_eq!(state.messages[1].content, "Error: model overloaded");
}

/// Tests that the raw transport stream yields the body bytes unchanged.
#[tokio::test]
async fn test_ask_returns_raw_chunks() {
    let body = sse_body(&["one", "two"]);
    let mock = Mock {
        answer_chunks: split_at(&body, &[5]),
        ..Mock::default()
    };
    let (base_url, _mock, _handle) = spawn_test_server(mock).await;
    let client = ApiClient::new(&base_url, Duration::from_secs(2), Duration::from_secs(5))
        .expect("Failed to build client");

    let mut stream = client.ask("q", false).await.expect("Ask should open");
    let mut received = Vec::new();
    while let Some(chunk) = stream.next().await {
        received.extend_from_slice(&chunk.expect("Chunk should arrive"));
    }
    assert_eq!(received, body);
}

// ============================================================================
// Credentials Tests
// ============================================================================

/// Tests the auth check and credential upload round trip.
#[tokio::test]
async fn test_credentials_flow() {
    let mock = Mock {
        auth: Reply::ok(json!({"authenticated": false})),
        ..Mock::default()
    };
    let (base_url, mock, _handle) = spawn_test_server(mock).await;
    let controller = controller(&base_url, 1);

    assert!(!controller.check_auth().await);

    let credentials = Credentials {
        client_id: "id-1".to_string(),
        client_key: "key-1".to_string(),
        realm: "eu".to_string(),
    };
    controller
        .save_credentials(&credentials)
        .await
        .expect("Credentials should save");

    assert_eq!(
        lock(&mock).saved,
        vec![json!({
            "stk_client_id": "id-1",
            "stk_client_key": "key-1",
            "stk_realm": "eu"
        })]
    );
}

/// Tests that a failed auth check counts as not authenticated.
#[tokio::test]
async fn test_auth_failure_is_not_authenticated() {
    let mock = Mock {
        auth: Reply::status(StatusCode::INTERNAL_SERVER_ERROR),
        save_status: StatusCode::BAD_REQUEST,
        ..Mock::default()
    };
    let (base_url, _mock, _handle) = spawn_test_server(mock).await;
    let controller = controller(&base_url, 1);

    assert!(!controller.check_auth().await);

    let credentials = Credentials {
        client_id: "id".to_string(),
        client_key: "key".to_string(),
        realm: "realm".to_string(),
    };
    let error = controller
        .save_credentials(&credentials)
        .await
        .expect_err("Rejected credentials should fail");
    assert_eq!(error.to_string(), "Failed to save credentials (HTTP 400)");
}
