//! Research engine client tests against an in-process fake engine.

use std::time::Duration;

use assert_matches::assert_matches;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use resq_engine::{ResearchBackend, ResearchEngineApi, ResearchEngineError};
use serde_json::{json, Value};

const TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Serve `router` on an ephemeral local port and return its base URL.
async fn spawn_engine(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn echo_research(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "status": "completed",
        "task": body["task"],
        "result": {"correlated_job": body["job_id"]},
    }))
}

async fn failing_research() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"detail": "Pipeline failed: provider quota exhausted"})),
    )
}

async fn slow_research() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({"status": "completed"}))
}

async fn plain_text_research() -> &'static str {
    "definitely not json"
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "ai_engine"}))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn research_returns_engine_payload() {
    let url = spawn_engine(Router::new().route("/research", post(echo_research))).await;
    let api = ResearchEngineApi::new(&url, TIMEOUT).unwrap();

    let payload = api.research(42, "Impact of generative AI on education").await.unwrap();

    assert_eq!(payload["status"], "completed");
    assert_eq!(payload["task"], "Impact of generative AI on education");
    assert_eq!(payload["result"]["correlated_job"], 42);
}

#[tokio::test]
async fn backend_trait_delegates_to_research() {
    let url = spawn_engine(Router::new().route("/research", post(echo_research))).await;
    let backend: Box<dyn ResearchBackend> = Box::new(ResearchEngineApi::new(&url, TIMEOUT).unwrap());

    let payload = backend.run_research(7, "X").await.unwrap();
    assert_eq!(payload["result"]["correlated_job"], 7);
}

#[tokio::test]
async fn server_error_carries_detail() {
    let url = spawn_engine(Router::new().route("/research", post(failing_research))).await;
    let api = ResearchEngineApi::new(&url, TIMEOUT).unwrap();

    let err = api.research(1, "X").await.unwrap_err();

    assert_matches!(err, ResearchEngineError::ApiError { status: 500, .. });
    assert_eq!(
        err.detail().as_deref(),
        Some("Pipeline failed: provider quota exhausted")
    );
}

#[tokio::test]
async fn slow_engine_times_out() {
    let url = spawn_engine(Router::new().route("/research", post(slow_research))).await;
    let api = ResearchEngineApi::new(&url, Duration::from_millis(200)).unwrap();

    let err = api.research(1, "X").await.unwrap_err();
    assert_matches!(err, ResearchEngineError::Timeout);
}

#[tokio::test]
async fn non_json_success_is_a_decode_error() {
    let url = spawn_engine(Router::new().route("/research", post(plain_text_research))).await;
    let api = ResearchEngineApi::new(&url, TIMEOUT).unwrap();

    let err = api.research(1, "X").await.unwrap_err();
    assert_matches!(err, ResearchEngineError::Decode(_));
}

#[tokio::test]
async fn unreachable_engine_is_a_request_error() {
    // Grab a free port, then release it so nothing is listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = ResearchEngineApi::new(&format!("http://{addr}"), TIMEOUT).unwrap();
    let err = api.research(1, "X").await.unwrap_err();
    assert_matches!(err, ResearchEngineError::Request(_));
    assert_eq!(err.detail(), None);
}

#[tokio::test]
async fn health_check_reports_status() {
    let url = spawn_engine(Router::new().route("/health", get(health))).await;
    let api = ResearchEngineApi::new(&url, TIMEOUT).unwrap();
    api.health().await.unwrap();

    let missing = spawn_engine(Router::new()).await;
    let api = ResearchEngineApi::new(&missing, TIMEOUT).unwrap();
    assert_matches!(
        api.health().await,
        Err(ResearchEngineError::ApiError { status: 404, .. })
    );
}
