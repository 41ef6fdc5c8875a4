//! Stale-task watchdog.
//!
//! A background loop that recovers tasks stuck in `in_progress`. Hot
//! parameters (enabled, action, TTL, interval, batch limit, project
//! filter) are re-read from the environment at the top of every iteration
//! so they can be changed without a restart. The loop exits cleanly
//! between iterations when cancelled; in-flight store calls run to
//! completion.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

use mnemo_shared::config::{WatchdogAction, WatchdogConfig};
use mnemo_shared::telemetry::Telemetry;
use mnemo_store::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct Watchdog {
    store: Store,
    telemetry: Telemetry,
}

impl Watchdog {
    pub fn new(store: Store, telemetry: Telemetry) -> Self {
        Self { store, telemetry }
    }

    /// Run until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!("watchdog.loop_started");
        loop {
            let config = WatchdogConfig::from_env();
            if config.enabled {
                // Scan failures are counted and logged; the loop never dies.
                let _ = self.scan(&config).await;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(config.interval_seconds)) => {}
            }
        }
        info!("watchdog.loop_stopped");
    }

    /// One scan iteration: execute the configured action and account for
    /// it. Returns the number of affected tasks.
    pub async fn scan(&self, config: &WatchdogConfig) -> Result<u64, StoreError> {
        let action = config.action.as_str();
        let span = tracing::info_span!(
            "Watchdog.scan",
            action,
            ttl_seconds = config.ttl_seconds,
            limit = config.batch_limit,
            project_id = config.project_id.as_deref(),
        );

        async {
            if !self.store.is_available() {
                self.telemetry.watchdog_error(action);
                error!(action, "watchdog.store_unavailable");
                return Err(StoreError::Unavailable);
            }

            let started = Instant::now();
            let outcome = match config.action {
                WatchdogAction::Requeue => {
                    self.store
                        .requeue_stale_in_progress(
                            config.ttl_seconds,
                            config.batch_limit,
                            config.project_id.as_deref(),
                        )
                        .await
                }
                WatchdogAction::Fail => {
                    self.store
                        .fail_stale_in_progress(
                            config.ttl_seconds,
                            config.batch_limit,
                            config.project_id.as_deref(),
                            "stale_ttl",
                        )
                        .await
                }
            };
            let duration = started.elapsed();

            match outcome {
                Ok(affected) => {
                    self.telemetry.watchdog_scan(action);
                    self.telemetry
                        .observe_watchdog_scan(action, duration.as_secs_f64());
                    let outcome_label = if affected > 0 { "ok" } else { "none" };
                    self.telemetry.watchdog_action(action, outcome_label);
                    info!(
                        action,
                        ttl_seconds = config.ttl_seconds,
                        limit = config.batch_limit,
                        project_id = config.project_id.as_deref(),
                        affected,
                        duration_ms = duration.as_millis() as u64,
                        "watchdog.scan_complete"
                    );
                    Ok(affected)
                }
                Err(err) => {
                    self.telemetry.watchdog_error(action);
                    error!(
                        action,
                        error = %err,
                        duration_ms = duration.as_millis() as u64,
                        "watchdog.scan_error"
                    );
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(action: WatchdogAction) -> WatchdogConfig {
        WatchdogConfig {
            enabled: true,
            action,
            ttl_seconds: 60,
            interval_seconds: 1,
            batch_limit: 10,
            project_id: None,
        }
    }

    #[tokio::test]
    async fn test_scan_with_unavailable_store_is_counted_not_fatal() {
        let watchdog = Watchdog::new(Store::unavailable(), Telemetry::new());
        let err = watchdog
            .scan(&config(WatchdogAction::Requeue))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_loop_exits_on_cancellation() {
        let watchdog = Watchdog::new(Store::unavailable(), Telemetry::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watchdog.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop exits promptly after cancel")
            .unwrap();
    }
}
