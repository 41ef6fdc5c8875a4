//! Router-level tests for auth, the envelope contract, and validation.
//!
//! These drive the axum router directly with `tower::ServiceExt::oneshot`
//! and an unconfigured store, so they cover every path that must work
//! without a database: the auth gate, tool lookup, validation errors, the
//! ingest path, and `ERR.DB_UNAVAILABLE` surfacing.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

use mnemo_orchestration::governance::{TokenLoadError, TokenLoader, TokenRecord};
use mnemo_orchestration::OrchestratorConfig;
use mnemo_server::{router, AppState};
use mnemo_shared::telemetry::TracingStatus;
use mnemo_shared::ServerConfig;
use mnemo_store::Store;

const TOKEN: &str = "secret-token";

struct NoTokens;

impl TokenLoader for NoTokens {
    fn load(&self, domain: &str) -> Result<Vec<TokenRecord>, TokenLoadError> {
        Err(TokenLoadError::DomainNotFound(domain.to_string()))
    }
}

fn test_config(allow_query_token: bool) -> ServerConfig {
    ServerConfig {
        mcp_token: TOKEN.to_string(),
        allow_query_token,
        allow_insecure_dev: false,
        database_url: None,
        orchestrator_enabled: true,
        ingest_max_content_chars: 100,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
    }
}

fn build_state(allow_query_token: bool) -> AppState {
    AppState::assemble(
        test_config(allow_query_token),
        Store::unavailable(),
        Arc::new(NoTokens),
        OrchestratorConfig::default(),
        TracingStatus::disabled(),
    )
}

fn app(state: &AppState) -> Router {
    router(state.clone())
}

async fn call(
    app: Router,
    uri: &str,
    auth: Option<&str>,
    body: JsonValue,
) -> (StatusCode, JsonValue) {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        request = request.header("authorization", auth);
    }
    let response = app
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, value)
}

fn assert_envelope(body: &JsonValue) {
    assert!(body["requestId"].as_str().is_some_and(|s| !s.is_empty()));
    assert!(body["serverVersion"].as_str().is_some());
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    assert!(body["elapsedMs"].as_u64().is_some());
}

#[tokio::test]
async fn test_missing_credential_is_401() {
    let state = build_state(false);
    let (status, body) = call(
        app(&state),
        "/tool/ingest_event",
        None,
        json!({"type": "conversation.message", "projectId": "p1", "content": "hi"}),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "ERR.UNAUTHORIZED");
    assert_envelope(&body);
}

#[tokio::test]
async fn test_wrong_credential_is_403() {
    let state = build_state(false);
    let (status, body) = call(
        app(&state),
        "/tool/ingest_event",
        Some("Bearer wrong"),
        json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "ERR.FORBIDDEN");
}

#[tokio::test]
async fn test_query_token_fallback_when_enabled() {
    let state = build_state(true);
    let (status, body) = call(
        app(&state),
        &format!("/tool/ingest_event?token={TOKEN}"),
        None,
        json!({"type": "conversation.message", "projectId": "p1", "content": "hi"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    // The same request is rejected when the fallback is off.
    let state = build_state(false);
    let (status, _) = call(
        app(&state),
        &format!("/tool/ingest_event?token={TOKEN}"),
        None,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_tool_is_404() {
    let state = build_state(false);
    let (status, body) = call(
        app(&state),
        "/tool/no_such_tool",
        Some(&format!("Bearer {TOKEN}")),
        json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "ERR.NOT_FOUND");
    assert_envelope(&body);
}

#[tokio::test]
async fn test_ingest_event_success_envelope_and_counters() {
    let state = build_state(false);
    let (status, body) = call(
        app(&state),
        "/tool/ingest_event",
        Some(&format!("Bearer {TOKEN}")),
        json!({
            "type": "conversation.message",
            "projectId": "Proj-1",
            "role": "User",
            "content": "hello there",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_envelope(&body);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["type"], "conversation.message");
    assert_eq!(body["projectId"], "proj-1", "project id is normalized");
    assert_eq!(state.bus.published_count("conversation.message"), 1);
}

#[tokio::test]
async fn test_validation_error_uses_200_transport() {
    let state = build_state(false);
    let (status, body) = call(
        app(&state),
        "/tool/ingest_event",
        Some(&format!("Bearer {TOKEN}")),
        json!({"type": "conversation.message", "projectId": "p1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "validation errors ride the envelope");
    assert_eq!(body["error"]["code"], "ERR.BAD_REQUEST");
    assert_eq!(body["error"]["message"], "content (string) is required");
    assert_envelope(&body);
}

#[tokio::test]
async fn test_unsupported_event_type_rejected() {
    let state = build_state(false);
    let (_, body) = call(
        app(&state),
        "/tool/ingest_event",
        Some(&format!("Bearer {TOKEN}")),
        json!({"type": "task.created", "projectId": "p1", "content": "x"}),
    )
    .await;
    assert_eq!(body["error"]["code"], "ERR.BAD_REQUEST");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unsupported event type"));
}

#[tokio::test]
async fn test_content_length_cap() {
    let state = build_state(false);
    let long_content = "x".repeat(101);
    let (status, body) = call(
        app(&state),
        "/tool/ingest_event",
        Some(&format!("Bearer {TOKEN}")),
        json!({"type": "conversation.message", "projectId": "p1", "content": long_content}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], "ERR.BAD_REQUEST");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("content exceeds max length (100)"));
}

#[tokio::test]
async fn test_store_backed_tool_reports_db_unavailable() {
    let state = build_state(false);
    for (tool, payload) in [
        ("add_memory", json!({"projectId": "p1", "content": "m"})),
        ("enqueue_task", json!({"projectId": "p1"})),
        ("get_next_task", json!({})),
        ("search_memory", json!({"query": "x"})),
        ("list_recent", json!({})),
        ("get_token_metrics", json!({})),
    ] {
        let (status, body) = call(
            app(&state),
            &format!("/tool/{tool}"),
            Some(&format!("Bearer {TOKEN}")),
            payload,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{tool} uses in-envelope error");
        assert_eq!(body["error"]["code"], "ERR.DB_UNAVAILABLE", "{tool}");
        assert_envelope(&body);
    }
}

#[tokio::test]
async fn test_update_task_status_rejects_unknown_status() {
    let state = build_state(false);
    let (status, body) = call(
        app(&state),
        "/tool/update_task_status",
        Some(&format!("Bearer {TOKEN}")),
        json!({"id": "t1", "status": "exploded"}),
    )
    .await;

    // Validation rejects before the store is consulted, so an
    // unconfigured store does not turn this into ERR.DB_UNAVAILABLE.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], "ERR.BAD_REQUEST");
}

#[tokio::test]
async fn test_activate_governance_works_without_store() {
    let state = build_state(false);
    let (status, body) = call(
        app(&state),
        "/tool/activate_governance",
        Some(&format!("Bearer {TOKEN}")),
        json!({"user_message": "Let's build a REST API with authentication"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["governance_activated"], true);
    let guidance = body["guidance"].as_str().unwrap().to_lowercase();
    assert!(guidance.contains("api"));
    assert!(guidance.contains("security"));
}

#[tokio::test]
async fn test_activate_governance_quiet_for_small_talk() {
    let state = build_state(false);
    let (_, body) = call(
        app(&state),
        "/tool/activate_governance",
        Some(&format!("Bearer {TOKEN}")),
        json!({"user_message": "good morning!"}),
    )
    .await;

    assert_eq!(body["governance_activated"], false);
    assert!(body["guidance"].is_null());

    // force_activation overrides the quiet path.
    let (_, body) = call(
        app(&state),
        "/tool/activate_governance",
        Some(&format!("Bearer {TOKEN}")),
        json!({"user_message": "good morning!", "force_activation": true}),
    )
    .await;
    assert_eq!(body["governance_activated"], true);
    assert!(body["guidance"].as_str().is_some());
}

#[tokio::test]
async fn test_malformed_json_body_is_bad_request() {
    let state = build_state(false);
    let request = Request::builder()
        .method("POST")
        .uri("/tool/ingest_event")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::from("{not json"))
        .unwrap();
    let response = app(&state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "ERR.BAD_REQUEST");
}

#[tokio::test]
async fn test_health_requires_no_auth() {
    let state = build_state(false);
    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app(&state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orchestratorRunning"], false);
    assert_eq!(body["storeConfigured"], false);
}

#[tokio::test]
async fn test_ingest_flows_through_orchestrator_to_guidance() {
    let state = build_state(false);
    state.orchestrator.start().await;

    let (status, _) = call(
        app(&state),
        "/tool/ingest_event",
        Some(&format!("Bearer {TOKEN}")),
        json!({
            "type": "conversation.message",
            "projectId": "p1",
            "content": "harden authentication for the api",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.bus.consumed_count("conversation.message"), 1);
    assert_eq!(state.bus.published_count("governance.guidance"), 1);
    assert_eq!(
        state.orchestrator.events_handled_count("conversation.message"),
        1
    );

    state.orchestrator.stop().await;
}
