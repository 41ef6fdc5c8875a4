//! Task queue tools: `enqueue_task`, `get_next_task`, `update_task_status`.

use serde_json::{json, Value as JsonValue};
use tracing::Instrument;
use uuid::Uuid;

use mnemo_shared::ToolError;
use mnemo_store::types::TaskStatus;

use crate::tools::params::{EnqueueTaskParams, GetNextTaskParams, UpdateTaskStatusParams};
use crate::tools::{optional_project, parse, require_str, required_project};
use crate::AppState;

pub async fn enqueue_task(state: &AppState, payload: JsonValue) -> Result<JsonValue, ToolError> {
    let params: EnqueueTaskParams = parse(payload)?;
    let project_id = required_project(params.project_id.as_deref())?;
    let task_payload = match params.payload {
        None | Some(JsonValue::Null) => json!({}),
        Some(obj @ JsonValue::Object(_)) => obj,
        Some(_) => return Err(ToolError::bad_request("payload must be an object")),
    };

    let id = Uuid::new_v4().to_string();
    state.store.enqueue_task(&id, &project_id, task_payload).await?;

    Ok(json!({
        "id": id,
        "status": "queued",
    }))
}

pub async fn get_next_task(state: &AppState, payload: JsonValue) -> Result<JsonValue, ToolError> {
    let params: GetNextTaskParams = parse(payload)?;
    let project_id = optional_project(params.project_id.as_deref())?;

    let span = tracing::info_span!("Task.claim", project_id = project_id.as_deref());
    let claimed = state
        .store
        .claim_next_task(project_id.as_deref())
        .instrument(span)
        .await?;

    state
        .telemetry
        .task_claim(if claimed.is_some() { "hit" } else { "miss" });

    Ok(json!({ "task": claimed }))
}

pub async fn update_task_status(
    state: &AppState,
    payload: JsonValue,
) -> Result<JsonValue, ToolError> {
    let params: UpdateTaskStatusParams = parse(payload)?;
    let id = require_str(params.id.as_deref(), "id")?;
    let status_raw = require_str(params.status.as_deref(), "status")?;
    let status: TaskStatus = status_raw.parse().map_err(|_| {
        ToolError::bad_request("status must be one of queued, in_progress, done, failed")
    })?;
    let result = match params.result {
        None | Some(JsonValue::Null) => None,
        Some(obj @ JsonValue::Object(_)) => Some(obj),
        Some(_) => return Err(ToolError::bad_request("result must be an object")),
    };

    let span = tracing::info_span!("Task.update_status", task_id = id, status = status.as_str());
    let updated = state
        .store
        .update_task_status(id, status, result)
        .instrument(span)
        .await?;

    let outcome = if updated { "ok" } else { "not_found" };
    state.telemetry.task_update(status.as_str(), outcome);

    if !updated {
        return Err(ToolError::not_found(format!("task not found: {id}")));
    }
    Ok(json!({
        "id": id,
        "status": status,
    }))
}
