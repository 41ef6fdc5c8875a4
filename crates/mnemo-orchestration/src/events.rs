//! In-process event bus.
//!
//! Typed pub/sub with a per-type handler registry. Handlers are awaited
//! sequentially in registration order within one publish, so delivery is
//! deterministic per call; no ordering is guaranteed across concurrent
//! publishes. Handler errors are isolated: they are counted and logged,
//! and the remaining handlers still run. `publish` itself never fails.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tracing::{error, info, Instrument};

use mnemo_shared::telemetry::{current_trace_ids, Telemetry};
use mnemo_shared::time::epoch_seconds;

/// Event type for ingested conversation messages.
pub const CONVERSATION_MESSAGE: &str = "conversation.message";

/// Event type for governance guidance republished by the orchestrator.
pub const GOVERNANCE_GUIDANCE: &str = "governance.guidance";

/// An event flowing over the bus. Immutable once published.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub project_id: String,
    pub payload: JsonValue,
    /// Wall-clock seconds since the epoch.
    pub ts: f64,
    /// Correlation id from the originating tool request, if any.
    pub request_id: Option<String>,
    /// W3C trace context propagated from upstream, if any.
    pub traceparent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("event type must be non-empty")]
    EmptyType,
    #[error("event projectId must be non-empty")]
    EmptyProjectId,
}

impl Event {
    /// Build a validated event stamped with the current wall clock.
    pub fn new(
        event_type: impl Into<String>,
        project_id: impl Into<String>,
        payload: JsonValue,
    ) -> Result<Self, EventError> {
        let event_type = event_type.into();
        let project_id = project_id.into();
        if event_type.trim().is_empty() {
            return Err(EventError::EmptyType);
        }
        if project_id.trim().is_empty() {
            return Err(EventError::EmptyProjectId);
        }
        Ok(Self {
            event_type,
            project_id,
            payload,
            ts: epoch_seconds(),
            request_id: None,
            traceparent: None,
        })
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_traceparent(mut self, traceparent: Option<String>) -> Self {
        self.traceparent = traceparent;
        self
    }
}

/// Error returned by an event handler. The bus records it and continues.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// An event handler with stable identity.
///
/// Handlers are registered as `Arc<dyn EventHandler>`; the `Arc`'s pointer
/// identity is what subscribe/unsubscribe dedup compares, so the same
/// handler instance can be registered at most once per event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short name used in subscription logs.
    fn name(&self) -> &str;

    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

pub type SharedHandler = Arc<dyn EventHandler>;

fn same_handler(a: &SharedHandler, b: &SharedHandler) -> bool {
    Arc::ptr_eq(a, b)
}

/// Per-type pub/sub with snapshot delivery and counter accounting.
pub struct EventBus {
    handlers: tokio::sync::Mutex<HashMap<String, Vec<SharedHandler>>>,
    published: DashMap<String, u64>,
    consumed: DashMap<String, u64>,
    handler_errors: DashMap<String, u64>,
    telemetry: Telemetry,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            handlers: tokio::sync::Mutex::new(HashMap::new()),
            published: DashMap::new(),
            consumed: DashMap::new(),
            handler_errors: DashMap::new(),
            telemetry,
        }
    }

    /// Register `handler` for `event_type`. Idempotent by handler identity.
    pub async fn subscribe(&self, event_type: &str, handler: SharedHandler) {
        let mut handlers = self.handlers.lock().await;
        let entry = handlers.entry(event_type.to_string()).or_default();
        if !entry.iter().any(|existing| same_handler(existing, &handler)) {
            info!(evt_type = event_type, handler = handler.name(), "eventbus.subscribe");
            entry.push(handler);
        }
    }

    /// Remove a previously-registered handler if present.
    pub async fn unsubscribe(&self, event_type: &str, handler: &SharedHandler) {
        let mut handlers = self.handlers.lock().await;
        if let Some(entry) = handlers.get_mut(event_type) {
            let before = entry.len();
            entry.retain(|existing| !same_handler(existing, handler));
            if entry.len() != before {
                info!(evt_type = event_type, handler = handler.name(), "eventbus.unsubscribe");
            }
        }
    }

    /// Publish an event and await every handler registered for its type.
    ///
    /// The handler list is snapshotted before invocation, so the registry
    /// lock is never held across a handler await and mid-publish
    /// (un)subscriptions do not affect this delivery.
    pub async fn publish(&self, event: Event) {
        let evt_type = event.event_type.clone();
        let span = tracing::info_span!(
            "EventBus.publish",
            evt_type = %evt_type,
            project_id = %event.project_id,
            request_id = event.request_id.as_deref(),
            phase = "publish",
        );

        async {
            increment(&self.published, &evt_type);
            self.telemetry.event_published(&evt_type);
            log_bus_event("eventbus.publish", &event, "publish");

            let snapshot: Vec<SharedHandler> = {
                let handlers = self.handlers.lock().await;
                handlers.get(&evt_type).cloned().unwrap_or_default()
            };

            for handler in snapshot {
                match handler.handle(&event).await {
                    Ok(()) => {
                        increment(&self.consumed, &evt_type);
                        self.telemetry.event_consumed(&evt_type);
                        log_bus_event("eventbus.consume", &event, "consume");
                    }
                    Err(err) => {
                        increment(&self.handler_errors, &evt_type);
                        self.telemetry.event_handler_error(&evt_type);
                        error!(
                            evt_type = %evt_type,
                            project_id = %event.project_id,
                            request_id = event.request_id.as_deref(),
                            handler = handler.name(),
                            error = %err,
                            phase = "error",
                            "eventbus.handler_error"
                        );
                    }
                }
            }
        }
        .instrument(span)
        .await;
    }

    pub fn published_count(&self, event_type: &str) -> u64 {
        counter_value(&self.published, event_type)
    }

    pub fn consumed_count(&self, event_type: &str) -> u64 {
        counter_value(&self.consumed, event_type)
    }

    pub fn handler_error_count(&self, event_type: &str) -> u64 {
        counter_value(&self.handler_errors, event_type)
    }

    /// Number of handlers currently registered for a type (tests/health).
    pub async fn handler_count(&self, event_type: &str) -> usize {
        self.handlers
            .lock()
            .await
            .get(event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

fn increment(counters: &DashMap<String, u64>, key: &str) {
    *counters.entry(key.to_string()).or_insert(0) += 1;
}

fn counter_value(counters: &DashMap<String, u64>, key: &str) -> u64 {
    counters.get(key).map(|v| *v).unwrap_or(0)
}

fn log_bus_event(message: &'static str, event: &Event, phase: &'static str) {
    match current_trace_ids() {
        Some((trace_id, span_id)) => info!(
            evt_type = %event.event_type,
            project_id = %event.project_id,
            request_id = event.request_id.as_deref(),
            phase,
            trace_id = %trace_id,
            span_id = %span_id,
            "{message}"
        ),
        None => info!(
            evt_type = %event.event_type,
            project_id = %event.project_id,
            request_id = event.request_id.as_deref(),
            phase,
            "{message}"
        ),
    }
}
