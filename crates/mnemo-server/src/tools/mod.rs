//! Tool implementations and dispatch.

pub mod events;
pub mod governance;
pub mod memory;
pub mod params;
pub mod records;
pub mod tasks;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use mnemo_shared::ident::normalize_project_id;
use mnemo_shared::ToolError;

use crate::envelope::ToolContext;
use crate::AppState;

/// Names of every registered tool, for capability listings.
pub const TOOL_NAMES: &[&str] = &[
    "activate_governance",
    "add_memory",
    "enqueue_task",
    "get_memory",
    "get_next_task",
    "get_token_metrics",
    "ingest_event",
    "list_recent",
    "log_error",
    "save_diff",
    "search_memory",
    "update_task_status",
];

/// Route a tool invocation by name. Unknown names are `ERR.NOT_FOUND`.
pub async fn dispatch(
    state: &AppState,
    name: &str,
    ctx: &ToolContext,
    payload: JsonValue,
) -> Result<JsonValue, ToolError> {
    match name {
        "ingest_event" => events::ingest_event(state, ctx, payload).await,
        "add_memory" => memory::add_memory(state, payload).await,
        "get_memory" => memory::get_memory(state, payload).await,
        "search_memory" => memory::search_memory(state, payload).await,
        "enqueue_task" => tasks::enqueue_task(state, payload).await,
        "get_next_task" => tasks::get_next_task(state, payload).await,
        "update_task_status" => tasks::update_task_status(state, payload).await,
        "save_diff" => records::save_diff(state, payload).await,
        "list_recent" => records::list_recent(state, payload).await,
        "log_error" => records::log_error(state, payload).await,
        "activate_governance" => governance::activate_governance(state, payload).await,
        "get_token_metrics" => governance::get_token_metrics(state, payload).await,
        _ => Err(ToolError::not_found(format!("unknown tool: {name}"))),
    }
}

pub(crate) fn parse<T: DeserializeOwned>(payload: JsonValue) -> Result<T, ToolError> {
    serde_json::from_value(payload)
        .map_err(|err| ToolError::bad_request(format!("invalid request: {err}")))
}

/// Require a non-blank string field.
pub(crate) fn require_str<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ToolError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ToolError::bad_request(format!("{field} (string) is required"))),
    }
}

/// Normalize a required project id.
pub(crate) fn required_project(value: Option<&str>) -> Result<String, ToolError> {
    let raw = require_str(value, "projectId")?;
    normalize_project_id(raw).map_err(|err| ToolError::bad_request(err.to_string()))
}

/// Normalize an optional project id; blank input means "not scoped".
pub(crate) fn optional_project(value: Option<&str>) -> Result<Option<String>, ToolError> {
    match value {
        Some(raw) if !raw.trim().is_empty() => normalize_project_id(raw)
            .map(Some)
            .map_err(|err| ToolError::bad_request(err.to_string())),
        _ => Ok(None),
    }
}

/// Clamp a caller-supplied limit into `1..=max`, with a default.
pub(crate) fn clamp_limit(value: Option<i64>, default: i64, max: i64) -> i64 {
    value.unwrap_or(default).clamp(1, max)
}
