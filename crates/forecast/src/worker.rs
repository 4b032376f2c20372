//! Long-running forecast worker: pops batch ids off the forecast
//! channel and runs the engine over each one.

use std::time::Duration;

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use tidecast_core::config::WorkerConfig;
use tidecast_core::model::{ForecastJob, FORECAST_CHANNEL};
use tidecast_queue::JobQueue;
use tidecast_store::TimeSeriesStore;

use crate::engine::ForecastEngine;

/// Block until both backends answer, retrying with a fixed backoff.
pub async fn wait_for_services(
    store: &dyn TimeSeriesStore,
    queue: &dyn JobQueue,
    config: &WorkerConfig,
) -> anyhow::Result<()> {
    let backoff = Duration::from_secs(config.startup_backoff_secs);
    for attempt in 1..=config.startup_retries {
        let store_ok = store.health_check().await;
        let queue_ok = queue.health_check().await;
        if store_ok.is_ok() && queue_ok.is_ok() {
            info!(attempt, "backends reachable");
            return Ok(());
        }
        if let Err(e) = &store_ok {
            warn!(attempt, error = %e, "database not ready");
        }
        if let Err(e) = &queue_ok {
            warn!(attempt, error = %e, "queue not ready");
        }
        tokio::time::sleep(backoff).await;
    }
    anyhow::bail!(
        "backends unreachable after {} attempts",
        config.startup_retries
    )
}

pub struct ForecastWorker {
    queue: Arc<dyn JobQueue>,
    engine: ForecastEngine,
    poll_timeout: Duration,
    error_sleep: Duration,
}

impl ForecastWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        engine: ForecastEngine,
        poll_timeout: Duration,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            queue,
            engine,
            poll_timeout,
            error_sleep: Duration::from_secs(config.error_sleep_secs),
        }
    }

    /// Consume jobs until `shutdown` fires.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        info!(channel = FORECAST_CHANNEL, "forecast worker started");
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("forecast worker shutting down");
                    return;
                }
                polled = self.queue.dequeue(FORECAST_CHANNEL, self.poll_timeout) => {
                    match polled {
                        Ok(Some(payload)) => self.handle_payload(&payload).await,
                        Ok(None) => {}
                        Err(e) => {
                            error!(error = %e, "dequeue failed, backing off");
                            tokio::time::sleep(self.error_sleep).await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_payload(&self, payload: &str) {
        let job: ForecastJob = match serde_json::from_str(payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, payload, "discarding malformed forecast job");
                return;
            }
        };
        info!(batch_id = %job.batch_id, "forecast job received");
        if let Err(e) = self.engine.process(&job).await {
            error!(batch_id = %job.batch_id, error = %e, "forecast job aborted");
            tokio::time::sleep(self.error_sleep).await;
        }
    }
}
