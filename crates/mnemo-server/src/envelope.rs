//! The response envelope.
//!
//! Every tool response carries `requestId`, `serverVersion`, `timestamp`
//! (UTC ISO-8601 with a trailing `Z`), and `elapsedMs`, merged with the
//! tool's payload or an `error` object. The HTTP layer stamps the measured
//! `elapsedMs` last so it is always authoritative.

use serde_json::{json, Map, Value as JsonValue};

use mnemo_shared::time::utc_now_iso_z;
use mnemo_shared::ToolError;

use crate::SERVER_VERSION;

/// Per-request context threaded through tool handlers.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub request_id: String,
    pub timestamp: String,
    pub traceparent: Option<String>,
}

impl ToolContext {
    pub fn new(traceparent: Option<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: utc_now_iso_z(),
            traceparent,
        }
    }
}

fn base(ctx: &ToolContext, elapsed_ms: u64) -> Map<String, JsonValue> {
    let mut fields = Map::new();
    fields.insert("requestId".into(), json!(ctx.request_id));
    fields.insert("serverVersion".into(), json!(SERVER_VERSION));
    fields.insert("timestamp".into(), json!(ctx.timestamp));
    fields.insert("elapsedMs".into(), json!(elapsed_ms));
    fields
}

/// Merge a tool's payload into the envelope. Envelope fields win on
/// collision.
pub fn success(ctx: &ToolContext, elapsed_ms: u64, payload: JsonValue) -> JsonValue {
    let mut merged = match payload {
        JsonValue::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".into(), other);
            map
        }
    };
    for (key, value) in base(ctx, elapsed_ms) {
        merged.insert(key, value);
    }
    JsonValue::Object(merged)
}

/// Envelope with an `error` object instead of a payload.
pub fn failure(ctx: &ToolContext, elapsed_ms: u64, error: &ToolError) -> JsonValue {
    let mut fields = base(ctx, elapsed_ms);
    fields.insert("error".into(), json!(error.to_wire()));
    JsonValue::Object(fields)
}
