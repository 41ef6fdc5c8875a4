//! Shared application state.

use std::sync::Arc;

use mnemo_orchestration::governance::{FileTokenLoader, GovernanceEngine, TokenLoader};
use mnemo_orchestration::{EventBus, Orchestrator, OrchestratorConfig};
use mnemo_shared::telemetry::{Telemetry, TracingStatus};
use mnemo_shared::ServerConfig;
use mnemo_store::{Store, StoreError};

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub bus: Arc<EventBus>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Store,
    pub engine: Arc<GovernanceEngine>,
    pub telemetry: Telemetry,
    pub tracing_status: Arc<TracingStatus>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Connect the store and assemble state from startup configuration.
    pub async fn init(
        config: ServerConfig,
        tracing_status: TracingStatus,
    ) -> Result<Self, StoreError> {
        let store = Store::connect(config.database_url.as_deref()).await?;
        let tags_dir = std::env::var("GOVERNANCE_TAGS_DIR")
            .unwrap_or_else(|_| "memory/tags".to_string());
        let loader: Arc<dyn TokenLoader> = Arc::new(FileTokenLoader::new(tags_dir));
        Ok(Self::assemble(
            config,
            store,
            loader,
            OrchestratorConfig::from_env(),
            tracing_status,
        ))
    }

    /// Assemble state from explicit parts (used directly by tests).
    pub fn assemble(
        config: ServerConfig,
        store: Store,
        loader: Arc<dyn TokenLoader>,
        orchestrator_config: OrchestratorConfig,
        tracing_status: TracingStatus,
    ) -> Self {
        let telemetry = Telemetry::new();
        let bus = Arc::new(EventBus::new(telemetry.clone()));
        let engine = Arc::new(GovernanceEngine::new(loader, store.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            bus.clone(),
            store.clone(),
            engine.clone(),
            telemetry.clone(),
            orchestrator_config,
        ));
        Self {
            config: Arc::new(config),
            bus,
            orchestrator,
            store,
            engine,
            telemetry,
            tracing_status: Arc::new(tracing_status),
        }
    }
}
