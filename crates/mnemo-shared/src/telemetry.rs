//! Telemetry adapter: counters, histograms, and the OTLP span pipeline.
//!
//! Instruments are created through the global OpenTelemetry meter. When no
//! SDK pipeline is installed the global meter is a no-op, so every call here
//! is safe (and free) with telemetry disabled. Spans are produced with
//! `tracing` macros at the call sites; [`setup_tracing`] decides whether a
//! real exporter backs them.

use std::collections::HashMap;
use std::env;

use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use serde::Serialize;

use crate::config::env_flag;

/// Whether the span pipeline should be installed. An explicit
/// `TRACING_ENABLED` wins; otherwise tracing defaults to on only in dev.
pub fn is_tracing_enabled() -> bool {
    if env::var("TRACING_ENABLED").is_ok() {
        return env_flag("TRACING_ENABLED", false);
    }
    env::var("ENV")
        .map(|e| e.trim().to_lowercase() == "dev")
        .unwrap_or(true)
}

/// Parse `OTEL_EXPORTER_OTLP_HEADERS`-style `k=v,k2=v2` pairs.
pub fn parse_headers_env(raw: Option<&str>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let Some(raw) = raw else {
        return headers;
    };
    for pair in raw.split(',') {
        if let Some((key, value)) = pair.split_once('=') {
            if !key.trim().is_empty() {
                headers.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    headers
}

/// Current tracing state, reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TracingStatus {
    pub enabled: bool,
    pub initialized: bool,
    pub exporter: Option<String>,
    pub endpoint: Option<String>,
}

impl TracingStatus {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            initialized: false,
            exporter: None,
            endpoint: None,
        }
    }
}

/// Result of [`setup_tracing`]: the status for health reporting plus the
/// provider (kept alive by the caller; dropping it flushes exporters).
pub struct TracingInit {
    pub status: TracingStatus,
    pub provider: Option<SdkTracerProvider>,
}

impl std::fmt::Debug for TracingInit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingInit")
            .field("status", &self.status)
            .finish()
    }
}

/// Initialize the OpenTelemetry span pipeline if enabled.
///
/// With `OTEL_EXPORTER_OTLP_TRACES_ENDPOINT` (or the generic
/// `OTEL_EXPORTER_OTLP_ENDPOINT`) set, spans are exported over OTLP/HTTP
/// with optional `OTEL_EXPORTER_OTLP_HEADERS`. Without an endpoint the
/// provider is still installed so spans carry valid trace ids into logs,
/// but nothing is exported.
pub fn setup_tracing(service_name: &str, service_version: &str) -> TracingInit {
    if !is_tracing_enabled() {
        return TracingInit {
            status: TracingStatus::disabled(),
            provider: None,
        };
    }

    let environment = env::var("ENV").unwrap_or_else(|_| "dev".to_string());
    let mut attributes = vec![
        KeyValue::new("service.version", service_version.to_string()),
        KeyValue::new("deployment.environment", environment.trim().to_lowercase()),
    ];
    if let Ok(extra) = env::var("OTEL_RESOURCE_ATTRIBUTES") {
        for (key, value) in parse_headers_env(Some(&extra)) {
            attributes.push(KeyValue::new(key, value));
        }
    }
    let resource = Resource::builder()
        .with_service_name(
            env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| service_name.to_string()),
        )
        .with_attributes(attributes)
        .build();

    let endpoint = env::var("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT")
        .or_else(|_| env::var("OTEL_EXPORTER_OTLP_ENDPOINT"))
        .ok()
        .filter(|e| !e.trim().is_empty());

    let mut builder = SdkTracerProvider::builder().with_resource(resource);
    let exporter_name = match &endpoint {
        Some(endpoint) => {
            let headers =
                parse_headers_env(env::var("OTEL_EXPORTER_OTLP_HEADERS").ok().as_deref());
            match opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(endpoint.clone())
                .with_headers(headers)
                .build()
            {
                Ok(exporter) => {
                    builder = builder.with_batch_exporter(exporter);
                    tracing::info!(endpoint = %endpoint, "otlp http span exporter configured");
                    Some("otlp_http".to_string())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to build otlp exporter");
                    None
                }
            }
        }
        None => None,
    };

    let provider = builder.build();
    global::set_tracer_provider(provider.clone());

    TracingInit {
        status: TracingStatus {
            enabled: true,
            initialized: true,
            exporter: exporter_name,
            endpoint,
        },
        provider: Some(provider),
    }
}

/// Trace/span ids of the currently active span, when one exists. Rendered
/// as 32/16 lowercase hex, matching the log contract.
pub fn current_trace_ids() -> Option<(String, String)> {
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    let context = tracing::Span::current().context();
    let span = opentelemetry::trace::TraceContextExt::span(&context);
    let span_context = span.span_context();
    if span_context.is_valid() {
        Some((
            span_context.trace_id().to_string(),
            span_context.span_id().to_string(),
        ))
    } else {
        None
    }
}

/// Counters and histograms emitted by the core.
///
/// Instrument handles are cheap clones over the global meter; keep one
/// instance in shared state and clone freely.
#[derive(Clone)]
pub struct Telemetry {
    events_published: Counter<u64>,
    events_consumed: Counter<u64>,
    event_handler_errors: Counter<u64>,
    orchestrator_handler_errors: Counter<u64>,
    task_claims: Counter<u64>,
    task_updates: Counter<u64>,
    watchdog_scans: Counter<u64>,
    watchdog_actions: Counter<u64>,
    watchdog_errors: Counter<u64>,
    mcp_requests: Counter<u64>,
    mcp_errors: Counter<u64>,
    request_duration: Histogram<f64>,
    watchdog_scan_duration: Histogram<f64>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        let meter = global::meter("mnemo");
        Self {
            events_published: meter
                .u64_counter("events_published_total")
                .with_description("Total events published")
                .build(),
            events_consumed: meter
                .u64_counter("events_consumed_total")
                .with_description("Total events consumed")
                .build(),
            event_handler_errors: meter
                .u64_counter("event_handler_errors_total")
                .with_description("Total event handler errors")
                .build(),
            orchestrator_handler_errors: meter
                .u64_counter("orchestrator_handler_errors_total")
                .with_description("Total orchestrator handler errors")
                .build(),
            task_claims: meter
                .u64_counter("task_claims_total")
                .with_description("Task claim attempts by result")
                .build(),
            task_updates: meter
                .u64_counter("task_updates_total")
                .with_description("Task status updates by status and outcome")
                .build(),
            watchdog_scans: meter
                .u64_counter("watchdog_scans_total")
                .with_description("Watchdog scan iterations by action")
                .build(),
            watchdog_actions: meter
                .u64_counter("watchdog_actions_total")
                .with_description("Watchdog actions by action and outcome")
                .build(),
            watchdog_errors: meter
                .u64_counter("watchdog_errors_total")
                .with_description("Watchdog errors by action")
                .build(),
            mcp_requests: meter
                .u64_counter("mcp_requests_total")
                .with_description("Total MCP tool requests by endpoint")
                .build(),
            mcp_errors: meter
                .u64_counter("mcp_errors_total")
                .with_description("Total MCP tool errors by endpoint and status")
                .build(),
            request_duration: meter
                .f64_histogram("mcp_request_duration_seconds")
                .with_description("Tool request latency")
                .build(),
            watchdog_scan_duration: meter
                .f64_histogram("watchdog_scan_duration_seconds")
                .with_description("Watchdog scan duration")
                .build(),
        }
    }

    pub fn event_published(&self, evt_type: &str) {
        self.events_published
            .add(1, &[KeyValue::new("type", evt_type.to_string())]);
    }

    pub fn event_consumed(&self, evt_type: &str) {
        self.events_consumed
            .add(1, &[KeyValue::new("type", evt_type.to_string())]);
    }

    pub fn event_handler_error(&self, evt_type: &str) {
        self.event_handler_errors
            .add(1, &[KeyValue::new("type", evt_type.to_string())]);
    }

    pub fn orchestrator_handler_error(&self, evt_type: &str) {
        self.orchestrator_handler_errors
            .add(1, &[KeyValue::new("type", evt_type.to_string())]);
    }

    pub fn task_claim(&self, result: &str) {
        self.task_claims
            .add(1, &[KeyValue::new("result", result.to_string())]);
    }

    pub fn task_update(&self, status: &str, outcome: &str) {
        self.task_updates.add(
            1,
            &[
                KeyValue::new("status", status.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
    }

    pub fn watchdog_scan(&self, action: &str) {
        self.watchdog_scans
            .add(1, &[KeyValue::new("action", action.to_string())]);
    }

    pub fn watchdog_action(&self, action: &str, outcome: &str) {
        self.watchdog_actions.add(
            1,
            &[
                KeyValue::new("action", action.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
    }

    pub fn watchdog_error(&self, action: &str) {
        self.watchdog_errors
            .add(1, &[KeyValue::new("action", action.to_string())]);
    }

    pub fn request(&self, endpoint: &str) {
        self.mcp_requests
            .add(1, &[KeyValue::new("endpoint", endpoint.to_string())]);
    }

    pub fn request_error(&self, endpoint: &str, status: u16) {
        self.mcp_errors.add(
            1,
            &[
                KeyValue::new("endpoint", endpoint.to_string()),
                KeyValue::new("status", status.to_string()),
            ],
        );
    }

    pub fn observe_request_duration(&self, endpoint: &str, seconds: f64) {
        self.request_duration
            .record(seconds, &[KeyValue::new("endpoint", endpoint.to_string())]);
    }

    pub fn observe_watchdog_scan(&self, action: &str, seconds: f64) {
        self.watchdog_scan_duration
            .record(seconds, &[KeyValue::new("action", action.to_string())]);
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers_env(Some("a=1, b = two ,malformed,=skip"));
        assert_eq!(headers.get("a").map(String::as_str), Some("1"));
        assert_eq!(headers.get("b").map(String::as_str), Some("two"));
        assert!(!headers.contains_key("malformed"));
        assert!(!headers.contains_key(""));
        assert!(parse_headers_env(None).is_empty());
    }

    #[test]
    #[serial]
    fn test_tracing_gate_explicit_flag_wins() {
        env::set_var("TRACING_ENABLED", "false");
        env::set_var("ENV", "dev");
        assert!(!is_tracing_enabled());

        env::set_var("TRACING_ENABLED", "true");
        env::set_var("ENV", "production");
        assert!(is_tracing_enabled());

        env::remove_var("TRACING_ENABLED");
        env::remove_var("ENV");
    }

    #[test]
    #[serial]
    fn test_tracing_gate_defaults_by_environment() {
        env::remove_var("TRACING_ENABLED");
        env::set_var("ENV", "production");
        assert!(!is_tracing_enabled());
        env::set_var("ENV", "dev");
        assert!(is_tracing_enabled());
        env::remove_var("ENV");
    }

    #[test]
    fn test_counters_are_noops_without_pipeline() {
        // With no SDK meter provider installed, instrument calls must not
        // panic or allocate per-call state.
        let telemetry = Telemetry::new();
        telemetry.event_published("conversation.message");
        telemetry.event_consumed("conversation.message");
        telemetry.event_handler_error("conversation.message");
        telemetry.task_claim("hit");
        telemetry.task_update("done", "ok");
        telemetry.watchdog_scan("requeue");
        telemetry.watchdog_action("requeue", "none");
        telemetry.watchdog_error("fail");
        telemetry.request("ingest_event");
        telemetry.request_error("ingest_event", 500);
        telemetry.observe_request_duration("ingest_event", 0.004);
        telemetry.observe_watchdog_scan("requeue", 0.1);
    }

    #[test]
    fn test_no_active_span_yields_no_ids() {
        assert!(current_trace_ids().is_none());
    }
}
