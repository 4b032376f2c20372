//! Long-running ingestion worker: blocking-pop jobs off the ingest
//! channel and feed them to the pipeline until shutdown is signalled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use tidecast_core::config::WorkerConfig;
use tidecast_core::model::{IngestJob, INGEST_CHANNEL};
use tidecast_queue::JobQueue;
use tidecast_store::TimeSeriesStore;

use crate::pipeline::IngestionPipeline;

/// Interval between stale-batch sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Block until both backends answer, retrying with a fixed backoff.
///
/// Gives docker-compose style deployments time to bring Redis and
/// Postgres up before the worker starts consuming.
pub async fn wait_for_services(
    store: &dyn TimeSeriesStore,
    queue: &dyn JobQueue,
    config: &WorkerConfig,
) -> anyhow::Result<()> {
    let backoff = Duration::from_secs(config.startup_backoff_secs);
    for attempt in 1..=config.startup_retries {
        let store_ok = store.health_check().await;
        let queue_ok = queue.health_check().await;
        match (&store_ok, &queue_ok) {
            (Ok(()), Ok(_)) => {
                info!(attempt, "backends reachable");
                return Ok(());
            }
            _ => {
                if let Err(e) = &store_ok {
                    warn!(attempt, error = %e, "database not ready");
                }
                if let Err(e) = &queue_ok {
                    warn!(attempt, error = %e, "queue not ready");
                }
            }
        }
        tokio::time::sleep(backoff).await;
    }
    anyhow::bail!(
        "backends unreachable after {} attempts",
        config.startup_retries
    )
}

pub struct IngestWorker {
    store: Arc<dyn TimeSeriesStore>,
    queue: Arc<dyn JobQueue>,
    pipeline: IngestionPipeline,
    poll_timeout: Duration,
    error_sleep: Duration,
    stale_after: Duration,
}

impl IngestWorker {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        queue: Arc<dyn JobQueue>,
        pipeline: IngestionPipeline,
        poll_timeout: Duration,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            pipeline,
            poll_timeout,
            error_sleep: Duration::from_secs(config.error_sleep_secs),
            stale_after: Duration::from_secs(config.stale_processing_secs),
        }
    }

    /// Consume jobs until `shutdown` fires. Dequeue and pipeline errors
    /// are logged and absorbed; only shutdown ends the loop.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        info!(channel = INGEST_CHANNEL, "ingest worker started");
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("ingest worker shutting down");
                    return;
                }
                _ = sweep.tick() => {
                    self.sweep_stale().await;
                }
                polled = self.queue.dequeue(INGEST_CHANNEL, self.poll_timeout) => {
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
        let job: IngestJob = match serde_json::from_str(payload) {
            Ok(job) => job,
            Err(e) => {
                // Malformed payloads are dropped, not retried.
                warn!(error = %e, payload, "discarding malformed ingest job");
                return;
            }
        };
        info!(batch_id = %job.batch_id, "ingest job received");
        if let Err(e) = self.pipeline.process(&job).await {
            error!(batch_id = %job.batch_id, error = %e, "ingest job aborted");
            tokio::time::sleep(self.error_sleep).await;
        }
    }

    async fn sweep_stale(&self) {
        match self.store.fail_stale_processing(self.stale_after).await {
            Ok(swept) if !swept.is_empty() => {
                warn!(batches = ?swept, "failed stale processing batches");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "stale batch sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidecast_queue::MemoryQueue;
    use tidecast_store::MemoryStore;

    fn worker_config(retries: u32) -> WorkerConfig {
        WorkerConfig {
            startup_retries: retries,
            startup_backoff_secs: 0,
            error_sleep_secs: 0,
            stale_processing_secs: 900,
        }
    }

    #[tokio::test]
    async fn test_wait_for_services_healthy() {
        let store = MemoryStore::new();
        let queue = MemoryQueue::new();
        wait_for_services(&store, &queue, &worker_config(3))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_worker_drains_job_then_stops() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let dir = tempfile::TempDir::new().unwrap();
        let pipeline = IngestionPipeline::new(
            store.clone(),
            queue.clone(),
            dir.path().to_path_buf(),
        );
        let worker = IngestWorker::new(
            store.clone(),
            queue.clone(),
            pipeline,
            Duration::from_millis(20),
            &worker_config(1),
        );

        // Unknown batch ids are discarded without error.
        queue
            .enqueue(INGEST_CHANNEL, r#"{"batch_id":"ghost","stored_filename":"x.csv"}"#)
            .await
            .unwrap();
        queue.enqueue(INGEST_CHANNEL, "not json").await.unwrap();

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.depth(INGEST_CHANNEL).await, 0);

        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
