//! Bearer authentication for tool requests.
//!
//! Presence is checked before validity: a request with no credential gets
//! `ERR.UNAUTHORIZED` (401), a wrong credential `ERR.FORBIDDEN` (403). The
//! `?token=` query fallback only exists when `MCP_ALLOW_QUERY_TOKEN=true`.

use mnemo_shared::{ServerConfig, ToolError};
use mnemo_shared::error::ErrorCode;

/// Validate a request's credential against the configured token.
pub fn authorize(
    config: &ServerConfig,
    authorization_header: Option<&str>,
    query_token: Option<&str>,
) -> Result<(), ToolError> {
    let bearer = authorization_header
        .and_then(|value| value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let supplied = match bearer {
        Some(token) => Some(token),
        None if config.allow_query_token => query_token.filter(|t| !t.is_empty()),
        None => None,
    };

    match supplied {
        None => Err(ToolError::new(
            ErrorCode::Unauthorized,
            "missing bearer token",
        )),
        Some(token) if token == config.mcp_token => Ok(()),
        Some(_) => Err(ToolError::new(ErrorCode::Forbidden, "invalid token")),
    }
}
