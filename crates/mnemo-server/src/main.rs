//! The mnemo server binary.

use std::time::Duration;

use tokio::signal;
use tracing::{error, info};

use mnemo_server::{router, AppState, SERVER_VERSION};
use mnemo_shared::telemetry::setup_tracing;
use mnemo_shared::{logging, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let tracing_init = setup_tracing("mnemo-server", SERVER_VERSION);
    match &tracing_init.provider {
        Some(provider) => logging::init_tracing_with_otel(provider),
        None => logging::init_tracing(),
    }

    info!(version = SERVER_VERSION, "starting mnemo server");

    let config = ServerConfig::from_env()
        .map_err(|err| anyhow::anyhow!("configuration error: {err}"))?;
    let bind_addr = config.bind_addr;
    let orchestrator_enabled = config.orchestrator_enabled;

    let state = AppState::init(config, tracing_init.status.clone()).await?;

    if orchestrator_enabled {
        state.orchestrator.start().await;
    } else {
        info!("orchestrator disabled (ORCHESTRATOR_ENABLED=false)");
    }

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "listening");

    let orchestrator = state.orchestrator.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received, stopping orchestrator");
    if tokio::time::timeout(Duration::from_secs(30), orchestrator.stop())
        .await
        .is_err()
    {
        error!("orchestrator stop timed out, forcing exit");
    }

    info!("mnemo server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
