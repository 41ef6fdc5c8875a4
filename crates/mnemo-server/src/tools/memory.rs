//! Memory tools: `add_memory`, `get_memory`, `search_memory`.

use serde_json::{json, Value as JsonValue};
use tracing::warn;
use uuid::Uuid;

use mnemo_shared::ToolError;
use mnemo_store::embedding::{compute_embedding, is_semantic_enabled};
use mnemo_store::memory::NewMemory;

use crate::tools::{clamp_limit, optional_project, parse, require_str, required_project};
use crate::tools::params::{AddMemoryParams, GetMemoryParams, SearchMemoryParams};
use crate::AppState;

const SEARCH_LIMIT_MAX: i64 = 200;
const SEARCH_LIMIT_DEFAULT: i64 = 20;

pub async fn add_memory(state: &AppState, payload: JsonValue) -> Result<JsonValue, ToolError> {
    let params: AddMemoryParams = parse(payload)?;
    let project_id = required_project(params.project_id.as_deref())?;
    let content = require_str(params.content.as_deref(), "content")?;
    let metadata = match params.metadata {
        None | Some(JsonValue::Null) => json!({}),
        Some(obj @ JsonValue::Object(_)) => obj,
        Some(_) => return Err(ToolError::bad_request("metadata must be an object")),
    };
    let quarantined = params.quarantined.unwrap_or(false);

    // Embeddings are best-effort: a misconfigured model never blocks the
    // write, the entry just lands without vector search.
    let embedding = if is_semantic_enabled() {
        match compute_embedding(content) {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(error = %err, "embedding unavailable, storing without vector");
                None
            }
        }
    } else {
        None
    };

    let id = Uuid::new_v4().to_string();
    state
        .store
        .add_memory(NewMemory {
            id: &id,
            project_id: &project_id,
            content,
            metadata,
            quarantined,
            embedding: embedding.as_deref(),
            group_id: None,
        })
        .await?;

    Ok(json!({
        "id": id,
        "projectId": project_id,
        "quarantined": quarantined,
    }))
}

pub async fn get_memory(state: &AppState, payload: JsonValue) -> Result<JsonValue, ToolError> {
    let params: GetMemoryParams = parse(payload)?;
    let id = require_str(params.id.as_deref(), "id")?;

    match state.store.get_memory(id).await? {
        Some(item) => Ok(json!({ "item": item })),
        None => Err(ToolError::not_found(format!("memory not found: {id}"))),
    }
}

pub async fn search_memory(state: &AppState, payload: JsonValue) -> Result<JsonValue, ToolError> {
    let params: SearchMemoryParams = parse(payload)?;
    let query = require_str(params.query.as_deref(), "query")?;
    let project_id = optional_project(params.project_id.as_deref())?;
    let include_quarantined = params.include_quarantined.unwrap_or(false);
    let limit = clamp_limit(params.limit, SEARCH_LIMIT_DEFAULT, SEARCH_LIMIT_MAX);

    let mode = params.mode.as_deref().unwrap_or("substring");
    let items = match mode {
        "substring" => {
            state
                .store
                .search_memory(query, project_id.as_deref(), limit, include_quarantined)
                .await?
        }
        "semantic" => {
            if !is_semantic_enabled() {
                return Err(ToolError::bad_request("semantic search is disabled"));
            }
            let embedding = compute_embedding(query)
                .map_err(|err| ToolError::bad_request(err.to_string()))?
                .ok_or_else(|| ToolError::bad_request("no embedding model configured"))?;
            let k = clamp_limit(params.k, limit, SEARCH_LIMIT_MAX);
            state
                .store
                .semantic_search_memory(
                    &embedding,
                    project_id.as_deref(),
                    k,
                    include_quarantined,
                    params.threshold,
                )
                .await?
        }
        other => {
            return Err(ToolError::bad_request(format!(
                "mode must be 'substring' or 'semantic', got '{other}'"
            )))
        }
    };

    Ok(json!({
        "count": items.len(),
        "items": items,
    }))
}
