//! UTC timestamp helpers.

use chrono::{SecondsFormat, Utc};

/// ISO-8601 UTC timestamp with a trailing `Z`, e.g.
/// `2026-08-01T12:34:56.123456Z`. This is the envelope `timestamp` format.
pub fn utc_now_iso_z() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Wall-clock seconds since the Unix epoch, fractional. Used for `Event.ts`.
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
