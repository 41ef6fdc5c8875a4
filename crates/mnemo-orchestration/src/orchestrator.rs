//! The orchestrator: lifecycle owner for conversation handling.
//!
//! Start subscribes the conversation handler, launches the idle tick (which
//! sweeps the bounded per-project history), and, when enabled, the task
//! watchdog. Stop cancels the background loops, awaits them, and
//! unsubscribes. Both are idempotent.
//!
//! The conversation handler re-raises its errors so the bus can count them;
//! the bus isolates the failure and continues with sibling handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

use mnemo_shared::config::env_flag;
use mnemo_shared::ident::normalize_project_id;
use mnemo_shared::telemetry::{current_trace_ids, Telemetry};
use mnemo_store::Store;

use crate::events::{
    Event, EventBus, EventHandler, HandlerError, SharedHandler, CONVERSATION_MESSAGE,
    GOVERNANCE_GUIDANCE,
};
use crate::governance::GovernanceEngine;
use crate::history::{HistoryConfig, RecentHistory};
use crate::watchdog::Watchdog;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub history: HistoryConfig,
    /// Cadence of the idle tick that sweeps idle project history.
    pub idle_tick: Duration,
    pub watchdog_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            idle_tick: Duration::from_secs(30),
            watchdog_enabled: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            watchdog_enabled: env_flag("TASK_WATCHDOG_ENABLED", false),
            ..Self::default()
        }
    }
}

struct Inner {
    bus: Arc<EventBus>,
    store: Store,
    engine: Arc<GovernanceEngine>,
    telemetry: Telemetry,
    history: RecentHistory,
    events_handled: DashMap<String, u64>,
    handler_errors: DashMap<String, u64>,
    running: AtomicBool,
}

#[derive(Default)]
struct RunState {
    handler: Option<SharedHandler>,
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Orchestrator {
    inner: Arc<Inner>,
    config: OrchestratorConfig,
    state: tokio::sync::Mutex<RunState>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        bus: Arc<EventBus>,
        store: Store,
        engine: Arc<GovernanceEngine>,
        telemetry: Telemetry,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                store,
                engine,
                telemetry,
                history: RecentHistory::new(config.history.clone()),
                events_handled: DashMap::new(),
                handler_errors: DashMap::new(),
                running: AtomicBool::new(false),
            }),
            config,
            state: tokio::sync::Mutex::new(RunState::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Subscribe the conversation handler and launch background loops.
    /// A second start while running is a no-op.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if self.is_running() {
            return;
        }

        let handler: SharedHandler = Arc::new(ConversationHandler {
            inner: self.inner.clone(),
        });
        self.inner
            .bus
            .subscribe(CONVERSATION_MESSAGE, handler.clone())
            .await;

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        {
            let inner = self.inner.clone();
            let tick = self.config.idle_tick;
            let cancel = cancel.child_token();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(tick) => inner.history.sweep_idle(),
                    }
                }
            }));
        }

        if self.config.watchdog_enabled {
            let watchdog =
                Watchdog::new(self.inner.store.clone(), self.inner.telemetry.clone());
            let cancel = cancel.child_token();
            tasks.push(tokio::spawn(async move {
                watchdog.run(cancel).await;
            }));
        }

        state.handler = Some(handler);
        state.cancel = Some(cancel);
        state.tasks = tasks;
        self.inner.running.store(true, Ordering::SeqCst);
        info!("orchestrator.start_ok");
    }

    /// Cancel background loops, await them, and unsubscribe. A stop while
    /// not running is a no-op. In-flight publishes run to completion.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if !self.is_running() {
            return;
        }

        if let Some(handler) = state.handler.take() {
            self.inner
                .bus
                .unsubscribe(CONVERSATION_MESSAGE, &handler)
                .await;
        }
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        for task in state.tasks.drain(..) {
            let _ = task.await;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        info!("orchestrator.stop_ok");
    }

    pub fn events_handled_count(&self, event_type: &str) -> u64 {
        self.inner
            .events_handled
            .get(event_type)
            .map(|v| *v)
            .unwrap_or(0)
    }

    pub fn handler_error_count(&self, event_type: &str) -> u64 {
        self.inner
            .handler_errors
            .get(event_type)
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Number of projects with tracked history (health/introspection).
    pub fn tracked_history_projects(&self) -> usize {
        self.inner.history.tracked_projects()
    }
}

struct ConversationHandler {
    inner: Arc<Inner>,
}

#[async_trait]
impl EventHandler for ConversationHandler {
    fn name(&self) -> &str {
        "orchestrator.conversation"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let content_len = event
            .payload
            .get("content")
            .and_then(|v| v.as_str())
            .map(str::len)
            .unwrap_or(0);

        let span = tracing::info_span!(
            "Orchestrator.handle",
            evt_type = %event.event_type,
            project_id = %event.project_id,
            request_id = event.request_id.as_deref(),
            content_len,
            phase = "consume",
        );

        let result = self.handle_inner(event, content_len).instrument(span).await;
        if let Err(err) = &result {
            increment(&self.inner.handler_errors, &event.event_type);
            self.inner
                .telemetry
                .orchestrator_handler_error(&event.event_type);
            error!(
                evt_type = %event.event_type,
                project_id = %event.project_id,
                request_id = event.request_id.as_deref(),
                error = %err,
                "orchestrator.handler_error"
            );
        }
        // Propagate so the bus records the handler error and continues
        // with sibling handlers.
        result
    }
}

impl ConversationHandler {
    async fn handle_inner(&self, event: &Event, content_len: usize) -> Result<(), HandlerError> {
        // Testing hook: the only path that exercises the bus error counter.
        if event
            .payload
            .get("force_error")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            return Err(HandlerError::new("forced_error"));
        }

        increment(&self.inner.events_handled, &event.event_type);

        // Content length only; message bodies are never logged.
        match current_trace_ids() {
            Some((trace_id, span_id)) => info!(
                evt_type = %event.event_type,
                project_id = %event.project_id,
                request_id = event.request_id.as_deref(),
                content_len,
                trace_id = %trace_id,
                span_id = %span_id,
                "orchestrator.handle"
            ),
            None => info!(
                evt_type = %event.event_type,
                project_id = %event.project_id,
                request_id = event.request_id.as_deref(),
                content_len,
                "orchestrator.handle"
            ),
        }

        self.maybe_emit_governance(event).await;
        Ok(())
    }

    async fn maybe_emit_governance(&self, event: &Event) {
        let Some(content) = event.payload.get("content").and_then(|v| v.as_str()) else {
            return;
        };
        if content.trim().is_empty() {
            return;
        }

        let project_key = normalize_project_id(&event.project_id)
            .unwrap_or_else(|_| event.project_id.trim().to_lowercase());

        let history = self.inner.history.snapshot(&project_key);
        let guidance = self
            .inner
            .engine
            .activate(content, &history, Some(&event.project_id))
            .await;

        // The current message joins the history only after the engine ran,
        // so the next call sees it as context rather than as itself.
        self.inner.history.record(&project_key, content);

        let Some(guidance) = guidance else {
            return;
        };

        let role = event.payload.get("role").cloned().unwrap_or(json!(null));
        let payload = json!({
            "content": guidance,
            "source": {
                "type": event.event_type,
                "request_id": event.request_id,
                "role": role,
            },
        });

        match Event::new(GOVERNANCE_GUIDANCE, event.project_id.clone(), payload) {
            Ok(mut guidance_event) => {
                guidance_event.request_id = event.request_id.clone();
                guidance_event.traceparent = event.traceparent.clone();
                self.inner.bus.publish(guidance_event).await;
            }
            Err(err) => {
                error!(error = %err, "failed to build governance event");
            }
        }
    }
}

fn increment(counters: &DashMap<String, u64>, key: &str) {
    *counters.entry(key.to_string()).or_insert(0) += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::tokens::{TokenLoadError, TokenLoader, TokenRecord};
    use serde_json::Value as JsonValue;
    use tokio::sync::Mutex as AsyncMutex;

    struct EmptyLoader;

    impl TokenLoader for EmptyLoader {
        fn load(&self, domain: &str) -> Result<Vec<TokenRecord>, TokenLoadError> {
            Err(TokenLoadError::DomainNotFound(domain.to_string()))
        }
    }

    struct Collector {
        events: AsyncMutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventHandler for Collector {
        fn name(&self) -> &str {
            "collector"
        }

        async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
            self.events.lock().await.push(event.clone());
            Ok(())
        }
    }

    fn build() -> (Arc<EventBus>, Orchestrator) {
        let telemetry = Telemetry::new();
        let bus = Arc::new(EventBus::new(telemetry.clone()));
        let engine = Arc::new(GovernanceEngine::new(
            Arc::new(EmptyLoader),
            Store::unavailable(),
        ));
        let orchestrator = Orchestrator::new(
            bus.clone(),
            Store::unavailable(),
            engine,
            telemetry,
            OrchestratorConfig {
                idle_tick: Duration::from_millis(10),
                ..OrchestratorConfig::default()
            },
        );
        (bus, orchestrator)
    }

    fn message(project_id: &str, content: &str) -> Event {
        Event::new(
            CONVERSATION_MESSAGE,
            project_id,
            json!({"content": content, "role": "user"}),
        )
        .unwrap()
        .with_request_id("req-1")
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let (bus, orchestrator) = build();
        assert!(!orchestrator.is_running());

        orchestrator.start().await;
        orchestrator.start().await;
        assert!(orchestrator.is_running());
        assert_eq!(bus.handler_count(CONVERSATION_MESSAGE).await, 1);

        orchestrator.stop().await;
        orchestrator.stop().await;
        assert!(!orchestrator.is_running());
        assert_eq!(bus.handler_count(CONVERSATION_MESSAGE).await, 0);
    }

    #[tokio::test]
    async fn test_ingest_to_governance_emission() {
        let (bus, orchestrator) = build();
        orchestrator.start().await;

        let collector = Arc::new(Collector {
            events: AsyncMutex::new(Vec::new()),
        });
        bus.subscribe(GOVERNANCE_GUIDANCE, collector.clone()).await;

        bus.publish(message("p1", "Let's build a REST API with authentication"))
            .await;

        assert_eq!(bus.published_count(CONVERSATION_MESSAGE), 1);
        assert_eq!(bus.consumed_count(CONVERSATION_MESSAGE), 1);
        assert_eq!(orchestrator.events_handled_count(CONVERSATION_MESSAGE), 1);

        let emitted = collector.events.lock().await;
        assert_eq!(emitted.len(), 1, "one governance.guidance event");
        let guidance = &emitted[0];
        assert_eq!(guidance.project_id, "p1");
        assert_eq!(guidance.request_id.as_deref(), Some("req-1"));
        let content = guidance.payload["content"].as_str().unwrap();
        assert!(!content.is_empty());
        let lowered = content.to_lowercase();
        assert!(lowered.contains("api"), "guidance mentions api: {content}");
        assert!(lowered.contains("security"), "guidance mentions security");
        assert_eq!(guidance.payload["source"]["type"], CONVERSATION_MESSAGE);
        assert_eq!(guidance.payload["source"]["role"], "user");

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_force_error_counts_on_bus_and_orchestrator() {
        let (bus, orchestrator) = build();
        orchestrator.start().await;

        let event = Event::new(
            CONVERSATION_MESSAGE,
            "p-error",
            json!({"content": "boom", "force_error": true}),
        )
        .unwrap();
        bus.publish(event).await;

        assert_eq!(bus.published_count(CONVERSATION_MESSAGE), 1);
        assert_eq!(bus.consumed_count(CONVERSATION_MESSAGE), 0);
        assert_eq!(bus.handler_error_count(CONVERSATION_MESSAGE), 1);
        assert_eq!(orchestrator.handler_error_count(CONVERSATION_MESSAGE), 1);
        assert_eq!(orchestrator.events_handled_count(CONVERSATION_MESSAGE), 0);

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_blank_content_emits_nothing() {
        let (bus, orchestrator) = build();
        orchestrator.start().await;

        let collector = Arc::new(Collector {
            events: AsyncMutex::new(Vec::new()),
        });
        bus.subscribe(GOVERNANCE_GUIDANCE, collector.clone()).await;

        bus.publish(message("p1", "   ")).await;
        let no_content: JsonValue = json!({"role": "user"});
        bus.publish(Event::new(CONVERSATION_MESSAGE, "p1", no_content).unwrap())
            .await;

        assert_eq!(orchestrator.events_handled_count(CONVERSATION_MESSAGE), 2);
        assert!(collector.events.lock().await.is_empty());
        assert_eq!(orchestrator.tracked_history_projects(), 0);

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_history_records_after_engine_call() {
        let (bus, orchestrator) = build();
        orchestrator.start().await;

        bus.publish(message("Proj-X", "first message about testing"))
            .await;
        bus.publish(message("Proj-X", "second message about testing"))
            .await;

        // History key is the normalized project id.
        let snapshot = orchestrator.inner.history.snapshot("proj-x");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0], "first message about testing");

        orchestrator.stop().await;
    }
}
