//! Stable wire error codes and the tool-layer error type.
//!
//! Codes are part of the external contract: they appear verbatim in the
//! response envelope's `error.code` field and must not change between
//! releases.

use serde::{Deserialize, Serialize};

/// Stable error codes surfaced in response envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Validation failure; returned in-envelope with a 200 transport.
    BadRequest,
    /// Missing credential (401).
    Unauthorized,
    /// Wrong credential (403).
    Forbidden,
    /// Unknown tool or missing entity (404).
    NotFound,
    /// Store not configured; returned in-envelope with a 200 transport.
    DbUnavailable,
    /// Uncaught server failure (500).
    Unavailable,
    /// Recorded in `Task.result` when the watchdog fails a stale task.
    StaleTask,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "ERR.BAD_REQUEST",
            ErrorCode::Unauthorized => "ERR.UNAUTHORIZED",
            ErrorCode::Forbidden => "ERR.FORBIDDEN",
            ErrorCode::NotFound => "ERR.NOT_FOUND",
            ErrorCode::DbUnavailable => "ERR.DB_UNAVAILABLE",
            ErrorCode::Unavailable => "ERR.UNAVAILABLE",
            ErrorCode::StaleTask => "ERR.STALE_TASK",
        }
    }

    /// HTTP transport status for this code. In-envelope codes report 200.
    pub const fn http_status(self) -> u16 {
        match self {
            ErrorCode::BadRequest | ErrorCode::DbUnavailable | ErrorCode::StaleTask => 200,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::Unavailable => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a tool handler, carried into the response envelope.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn db_unavailable() -> Self {
        Self::new(ErrorCode::DbUnavailable, "DATABASE_URL not configured")
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    /// Wire shape for the envelope's `error` field.
    pub fn to_wire(&self) -> WireError {
        WireError {
            code: self.code.as_str().to_string(),
            message: self.message.clone(),
        }
    }
}

/// Serialized form of [`ToolError`] inside the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}
