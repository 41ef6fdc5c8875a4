//! Request parameter structs for every tool.
//!
//! Fields are optional at the serde layer; each tool validates presence and
//! shape itself so that missing-field errors read as contract messages
//! (`"content (string) is required"`) rather than serde internals.

use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Default, Deserialize)]
pub struct IngestEventParams {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    pub role: Option<String>,
    pub content: Option<String>,
    /// Testing hook: propagated into the event payload to exercise the
    /// bus error path.
    pub force_error: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddMemoryParams {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    pub content: Option<String>,
    pub metadata: Option<JsonValue>,
    pub quarantined: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GetMemoryParams {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchMemoryParams {
    pub query: Option<String>,
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    pub limit: Option<i64>,
    #[serde(rename = "includeQuarantined")]
    pub include_quarantined: Option<bool>,
    /// `substring` (default) or `semantic`.
    pub mode: Option<String>,
    pub k: Option<i64>,
    pub threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnqueueTaskParams {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    pub payload: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GetNextTaskParams {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskStatusParams {
    pub id: Option<String>,
    pub status: Option<String>,
    pub result: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveDiffParams {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
    pub diff: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRecentParams {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogErrorParams {
    pub level: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    pub context: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivateGovernanceParams {
    pub user_message: Option<String>,
    pub conversation_history: Option<Vec<String>>,
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    pub force_activation: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GetTokenMetricsParams {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    /// A single token id or a list of them.
    #[serde(rename = "tokenIds")]
    pub token_ids: Option<JsonValue>,
    #[serde(rename = "minActivations")]
    pub min_activations: Option<i64>,
    pub limit: Option<i64>,
}

impl GetTokenMetricsParams {
    /// Accepts a string or an array of strings; blank entries dropped.
    pub fn normalized_token_ids(&self) -> Option<Vec<String>> {
        match &self.token_ids {
            Some(JsonValue::String(one)) if !one.trim().is_empty() => {
                Some(vec![one.trim().to_string()])
            }
            Some(JsonValue::Array(items)) => {
                let ids: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if ids.is_empty() {
                    None
                } else {
                    Some(ids)
                }
            }
            _ => None,
        }
    }
}
