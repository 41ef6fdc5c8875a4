//! HTTP routing and the tool dispatch endpoint.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tower_http::trace::TraceLayer;
use tracing::{error, info, Instrument};

use mnemo_shared::ToolError;

use crate::envelope::{failure, success, ToolContext};
use crate::{auth, tools, AppState, SERVER_VERSION};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tool/{name}", post(tool_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unauthenticated liveness probe.
async fn health(State(state): State<AppState>) -> Json<JsonValue> {
    Json(json!({
        "serverVersion": SERVER_VERSION,
        "status": "ok",
        "orchestratorRunning": state.orchestrator.is_running(),
        "storeConfigured": state.store.is_available(),
        "tracing": state.tracing_status.as_ref(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct AuthQuery {
    token: Option<String>,
}

async fn tool_endpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let traceparent = headers
        .get("traceparent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ctx = ToolContext::new(traceparent);
    let started = Instant::now();

    state.telemetry.request(&name);

    let authorization = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if let Err(err) = auth::authorize(&state.config, authorization, query.token.as_deref()) {
        return respond(&state, &name, &ctx, started, Err(err));
    }

    let payload: JsonValue = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(err) => {
                let err = ToolError::bad_request(format!("request body is not valid JSON: {err}"));
                return respond(&state, &name, &ctx, started, Err(err));
            }
        }
    };

    let span = tracing::info_span!(
        "tool_request",
        endpoint = %name,
        request_id = %ctx.request_id,
    );
    let result = tools::dispatch(&state, &name, &ctx, payload)
        .instrument(span)
        .await;

    respond(&state, &name, &ctx, started, result)
}

fn respond(
    state: &AppState,
    name: &str,
    ctx: &ToolContext,
    started: Instant,
    result: Result<JsonValue, ToolError>,
) -> Response {
    let elapsed = started.elapsed();
    let elapsed_ms = elapsed.as_millis() as u64;
    state
        .telemetry
        .observe_request_duration(name, elapsed.as_secs_f64());

    match result {
        Ok(payload) => {
            info!(
                endpoint = name,
                request_id = %ctx.request_id,
                elapsed_ms,
                status = "ok",
                "tool_complete"
            );
            (StatusCode::OK, Json(success(ctx, elapsed_ms, payload))).into_response()
        }
        Err(err) => {
            let status = err.code.http_status();
            state.telemetry.request_error(name, status);
            error!(
                endpoint = name,
                request_id = %ctx.request_id,
                elapsed_ms,
                code = err.code.as_str(),
                error = %err.message,
                "tool_error"
            );
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(failure(ctx, elapsed_ms, &err))).into_response()
        }
    }
}
