//! Row types shared by the store modules and the tool layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A stored memory entry. Never mutated after insert.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: String,
    pub project_id: String,
    pub content: String,
    #[sqlx(default)]
    pub metadata: Option<JsonValue>,
    pub quarantined: bool,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

/// Task queue state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    InProgress,
    Done,
    Failed,
}

impl TaskStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    /// Terminal states accept no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full task row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub status: TaskStatus,
    pub payload: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The slice of a task handed to a worker by a successful claim.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedTask {
    pub id: String,
    pub project_id: String,
    pub status: TaskStatus,
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Diff listing row (the diff body is not returned by listings).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DiffRecord {
    pub id: String,
    pub project_id: String,
    pub file_path: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Error record severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Info,
    Warn,
    Error,
}

impl ErrorLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorLevel::Info => "info",
            ErrorLevel::Warn => "warn",
            ErrorLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for ErrorLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(ErrorLevel::Info),
            "warn" => Ok(ErrorLevel::Warn),
            "error" => Ok(ErrorLevel::Error),
            _ => Err(()),
        }
    }
}

/// Stale in-progress task preview row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StaleTask {
    pub id: String,
    pub project_id: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub age_seconds: Option<f64>,
}

/// Accumulated effectiveness metric for one governance token in one project.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetric {
    pub token_id: String,
    pub project_id: String,
    pub activation_count: i32,
    pub effectiveness_score: f64,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_round_trip() {
        for status in [
            TaskStatus::Queued,
            TaskStatus::InProgress,
            TaskStatus::Done,
            TaskStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("running".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_wire_casing() {
        let entry = MemoryEntry {
            id: "m1".into(),
            project_id: "p1".into(),
            content: "hello".into(),
            metadata: Some(serde_json::json!({"k": 1})),
            quarantined: false,
            created_at: Utc::now(),
            group_id: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("projectId").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("group_id").is_none());
    }

    #[test]
    fn test_error_level_parse() {
        assert_eq!("warn".parse::<ErrorLevel>().unwrap(), ErrorLevel::Warn);
        assert!("critical".parse::<ErrorLevel>().is_err());
    }
}
