//! The ingestion state machine.
//!
//! One job = one batch: `uploaded → processing → {completed | failed}`.
//! Both end states are terminal; a failed batch is re-submitted as a new
//! batch. All fact upserts for a batch land in one store transaction, so
//! readers see either the pre-batch or the fully committed state.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use tidecast_core::model::{ForecastJob, IngestJob, RowCounters, FORECAST_CHANNEL};
use tidecast_queue::{client::enqueue_job, JobQueue};
use tidecast_store::TimeSeriesStore;

use crate::dataset::parse_dataset;
use crate::error::IngestError;

/// What processing one job did to its batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Batch reached `completed`; a forecast job was enqueued.
    Completed(RowCounters),
    /// Batch reached `failed`; the message is persisted on the batch.
    Failed(String),
    /// Job discarded: unknown batch id or already-terminal batch.
    Skipped,
}

pub struct IngestionPipeline {
    store: Arc<dyn TimeSeriesStore>,
    queue: Arc<dyn JobQueue>,
    upload_dir: PathBuf,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        queue: Arc<dyn JobQueue>,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            queue,
            upload_dir,
        }
    }

    /// Process one ingestion job to completion.
    ///
    /// Validation and persistence failures are terminal for the batch and
    /// return `Ok(Failed)`; an `Err` means a status write or the forecast
    /// hand-off itself failed and nothing more can be recorded.
    pub async fn process(&self, job: &IngestJob) -> Result<BatchOutcome, IngestError> {
        let batch_id = &job.batch_id;

        let Some(batch) = self.store.get_batch(batch_id).await? else {
            warn!(batch_id = %batch_id, "batch not found, discarding job");
            return Ok(BatchOutcome::Skipped);
        };
        if batch.status.is_terminal() {
            warn!(
                batch_id = %batch_id,
                status = %batch.status,
                "batch already terminal, discarding duplicate job"
            );
            return Ok(BatchOutcome::Skipped);
        }

        if !self.store.set_batch_processing(batch_id).await? {
            warn!(batch_id = %batch_id, "batch no longer claimable, discarding job");
            return Ok(BatchOutcome::Skipped);
        }

        let path = self.upload_dir.join(&job.stored_filename);
        let dataset = match parse_dataset(&path) {
            Ok(ds) => ds,
            Err(e) => {
                let msg = e.to_string();
                warn!(batch_id = %batch_id, error = %msg, "dataset rejected");
                self.store.mark_batch_failed(batch_id, &msg).await?;
                return Ok(BatchOutcome::Failed(msg));
            }
        };

        let (inserted, updated) = match self
            .store
            .apply_fact_rows(batch_id, &batch.file_hash, &dataset.rows)
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                // The store rolled the whole transaction back; no partial
                // rows survive.
                let msg = e.to_string();
                warn!(batch_id = %batch_id, error = %msg, "batch transaction failed");
                self.store.mark_batch_failed(batch_id, &msg).await?;
                return Ok(BatchOutcome::Failed(msg));
            }
        };

        let counters = RowCounters {
            total: dataset.num_total_rows,
            missing: dataset.num_missing_rows,
            imputed: dataset.num_imputed_rows,
            inserted,
            updated,
        };
        self.store.mark_batch_completed(batch_id, counters).await?;

        enqueue_job(
            self.queue.as_ref(),
            FORECAST_CHANNEL,
            &ForecastJob {
                batch_id: batch_id.clone(),
            },
        )
        .await?;

        info!(
            batch_id = %batch_id,
            total = counters.total,
            imputed = counters.imputed,
            inserted = counters.inserted,
            updated = counters.updated,
            "batch completed"
        );
        Ok(BatchOutcome::Completed(counters))
    }
}
