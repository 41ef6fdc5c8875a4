//! Append-only record tools: `save_diff`, `list_recent`, `log_error`.

use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use mnemo_shared::ToolError;
use mnemo_store::types::ErrorLevel;

use crate::tools::params::{ListRecentParams, LogErrorParams, SaveDiffParams};
use crate::tools::{clamp_limit, optional_project, parse, require_str, required_project};
use crate::AppState;

pub async fn save_diff(state: &AppState, payload: JsonValue) -> Result<JsonValue, ToolError> {
    let params: SaveDiffParams = parse(payload)?;
    let project_id = required_project(params.project_id.as_deref())?;
    let file_path = require_str(params.file_path.as_deref(), "filePath")?;
    let diff = require_str(params.diff.as_deref(), "diff")?;
    let author = params.author.as_deref().filter(|a| !a.trim().is_empty());

    let id = Uuid::new_v4().to_string();
    state
        .store
        .save_diff(&id, &project_id, file_path, diff, author)
        .await?;

    Ok(json!({
        "id": id,
        "projectId": project_id,
        "filePath": file_path,
        "author": author,
    }))
}

pub async fn list_recent(state: &AppState, payload: JsonValue) -> Result<JsonValue, ToolError> {
    let params: ListRecentParams = parse(payload)?;
    let project_id = optional_project(params.project_id.as_deref())?;
    let limit = clamp_limit(params.limit, 20, 200);

    let items = state
        .store
        .list_recent_diffs(project_id.as_deref(), limit)
        .await?;

    Ok(json!({
        "count": items.len(),
        "items": items,
    }))
}

pub async fn log_error(state: &AppState, payload: JsonValue) -> Result<JsonValue, ToolError> {
    let params: LogErrorParams = parse(payload)?;
    let level_raw = require_str(params.level.as_deref(), "level")?;
    let level: ErrorLevel = level_raw
        .parse()
        .map_err(|_| ToolError::bad_request("level must be one of info, warn, error"))?;
    let message = require_str(params.message.as_deref(), "message")?;
    let project_id = optional_project(params.project_id.as_deref())?;
    let context = match params.context {
        None | Some(JsonValue::Null) => json!({}),
        Some(obj @ JsonValue::Object(_)) => obj,
        Some(_) => return Err(ToolError::bad_request("context must be an object")),
    };

    let id = Uuid::new_v4().to_string();
    state
        .store
        .log_error(&id, level, message, project_id.as_deref(), context)
        .await?;

    Ok(json!({
        "id": id,
        "level": level,
    }))
}
