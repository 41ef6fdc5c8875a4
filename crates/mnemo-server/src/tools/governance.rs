//! Governance tools: `activate_governance`, `get_token_metrics`.

use serde_json::{json, Value as JsonValue};

use mnemo_shared::{ToolError, GLOBAL_PROJECT_ID};

use crate::tools::params::{ActivateGovernanceParams, GetTokenMetricsParams};
use crate::tools::{clamp_limit, optional_project, parse, require_str};
use crate::AppState;

const METRICS_LIMIT_MAX: i64 = 500;
const METRICS_LIMIT_DEFAULT: i64 = 50;

pub async fn activate_governance(
    state: &AppState,
    payload: JsonValue,
) -> Result<JsonValue, ToolError> {
    let params: ActivateGovernanceParams = parse(payload)?;
    let user_message = require_str(params.user_message.as_deref(), "user_message")?;
    let history = params.conversation_history.unwrap_or_default();
    let project_id = params.project_id.as_deref();

    let mut guidance = state
        .engine
        .activate(user_message, &history, project_id)
        .await;
    if guidance.is_none() && params.force_activation == Some(true) {
        guidance = Some(
            state
                .engine
                .activate_forced(user_message, &history, project_id)
                .await,
        );
    }

    let activated = guidance.is_some();
    let message = if activated {
        "Governance activated - apply these principles during planning and implementation"
    } else {
        "No governance activation needed for this context"
    };

    Ok(json!({
        "success": true,
        "governance_activated": activated,
        "guidance": guidance,
        "message": message,
    }))
}

pub async fn get_token_metrics(
    state: &AppState,
    payload: JsonValue,
) -> Result<JsonValue, ToolError> {
    let params: GetTokenMetricsParams = parse(payload)?;
    let project_id = optional_project(params.project_id.as_deref())?;
    let token_ids = params.normalized_token_ids();
    let min_activations = params.min_activations.unwrap_or(0).max(0) as i32;
    let limit = clamp_limit(params.limit, METRICS_LIMIT_DEFAULT, METRICS_LIMIT_MAX);

    let items = state
        .store
        .fetch_token_metrics(
            token_ids.as_deref(),
            project_id.as_deref(),
            min_activations,
            limit,
        )
        .await?;

    Ok(json!({
        "projectId": project_id.as_deref().unwrap_or(GLOBAL_PROJECT_ID),
        "minActivations": min_activations,
        "limit": limit,
        "count": items.len(),
        "items": items,
        "tokenIds": token_ids,
    }))
}
