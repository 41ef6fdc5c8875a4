//! `ingest_event`: validate and publish a conversation event.

use serde_json::{json, Value as JsonValue};

use mnemo_orchestration::{Event, CONVERSATION_MESSAGE};
use mnemo_shared::ToolError;

use crate::envelope::ToolContext;
use crate::tools::{parse, params::IngestEventParams, require_str, required_project};
use crate::AppState;

pub async fn ingest_event(
    state: &AppState,
    ctx: &ToolContext,
    payload: JsonValue,
) -> Result<JsonValue, ToolError> {
    let params: IngestEventParams = parse(payload)?;

    let event_type = require_str(params.event_type.as_deref(), "type")?;
    if event_type != CONVERSATION_MESSAGE {
        return Err(ToolError::bad_request(format!(
            "unsupported event type: {event_type}"
        )));
    }
    let project_id = required_project(params.project_id.as_deref())?;
    let content = require_str(params.content.as_deref(), "content")?;
    let max = state.config.ingest_max_content_chars;
    if content.len() > max {
        return Err(ToolError::bad_request(format!(
            "content exceeds max length ({max})"
        )));
    }
    let role = params.role.as_deref().map(str::to_lowercase);

    let mut event_payload = json!({
        "role": role,
        "content": content,
    });
    if params.force_error == Some(true) {
        event_payload["force_error"] = json!(true);
    }

    let event = Event::new(CONVERSATION_MESSAGE, project_id.clone(), event_payload)
        .map_err(|err| ToolError::bad_request(err.to_string()))?
        .with_request_id(ctx.request_id.clone())
        .with_traceparent(ctx.traceparent.clone());

    state.bus.publish(event).await;

    Ok(json!({
        "status": "ok",
        "type": event_type,
        "projectId": project_id,
    }))
}
