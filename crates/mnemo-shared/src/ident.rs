//! Project identifier normalization.
//!
//! Every `projectId` entering the system passes through
//! [`normalize_project_id`] so that differing whitespace, casing, or unusual
//! characters cannot create accidental high-cardinality keys.

/// Sentinel project id used when a metric is not scoped to a project.
pub const GLOBAL_PROJECT_ID: &str = "global";

/// Default maximum length for a normalized project id.
pub const DEFAULT_MAX_PROJECT_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectIdError {
    #[error("projectId (string) is required")]
    Empty,
    #[error("projectId exceeds max length ({0})")]
    TooLong(usize),
    #[error("projectId may only contain lowercase letters, numbers, '.', '_' or '-'")]
    InvalidCharacter,
    #[error("projectId must start with a letter or digit")]
    InvalidLeadingCharacter,
}

/// Return a normalized project id or an error describing why the value is
/// invalid.
///
/// Normalization: trim, lowercase, cap length, restrict to
/// `[a-z0-9._-]` with an alphanumeric first character. Idempotent: feeding
/// the output back in yields the same string.
pub fn normalize_project_id(raw: &str) -> Result<String, ProjectIdError> {
    normalize_project_id_with_max(raw, DEFAULT_MAX_PROJECT_ID_LEN)
}

pub fn normalize_project_id_with_max(
    raw: &str,
    max_length: usize,
) -> Result<String, ProjectIdError> {
    let candidate = raw.trim().to_lowercase();
    if candidate.is_empty() {
        return Err(ProjectIdError::Empty);
    }
    if candidate.len() > max_length {
        return Err(ProjectIdError::TooLong(max_length));
    }

    let mut chars = candidate.chars();
    let first = chars.next().expect("non-empty after trim");
    if !first.is_ascii_alphanumeric() {
        return Err(ProjectIdError::InvalidLeadingCharacter);
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
        return Err(ProjectIdError::InvalidCharacter);
    }

    Ok(candidate)
}

/// Normalize an optional project id, mapping missing/blank input to the
/// `"global"` sentinel. Used for governance token metrics, which are keyed
/// by `(token_id, project_id)` with a non-null project column.
pub fn normalize_project_id_or_global(raw: Option<&str>) -> Result<String, ProjectIdError> {
    match raw {
        Some(value) if !value.trim().is_empty() => normalize_project_id(value),
        _ => Ok(GLOBAL_PROJECT_ID.to_string()),
    }
}
