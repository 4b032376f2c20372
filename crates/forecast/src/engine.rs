//! Runs every model over every category touched by a batch and upserts
//! the results.
//!
//! The engine is stateless; re-running a batch id refreshes the same
//! (date, category, model) rows in place. Failures are isolated at two
//! levels: a model failure removes only that model's output for the
//! category, and a category's transaction failure leaves the remaining
//! categories to proceed.

use std::sync::Arc;

use chrono::{Days, Utc};
use tracing::{info, warn};

use tidecast_core::model::{ForecastJob, ForecastRecord, ModelKind};
use tidecast_store::{StoreError, TimeSeriesStore};

use crate::models::model_for;

/// Minimum distinct observation days before any model runs.
pub const MIN_HISTORY_DAYS: usize = 7;

/// What processing one forecast job did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineOutcome {
    pub categories_processed: usize,
    pub categories_skipped: usize,
    pub records_written: usize,
}

pub struct ForecastEngine {
    store: Arc<dyn TimeSeriesStore>,
    horizon_days: u32,
    confidence_level: f64,
}

impl ForecastEngine {
    pub fn new(store: Arc<dyn TimeSeriesStore>, horizon_days: u32, confidence_level: f64) -> Self {
        Self {
            store,
            horizon_days,
            confidence_level,
        }
    }

    /// Forecast every category the batch wrote facts for.
    pub async fn process(&self, job: &ForecastJob) -> Result<EngineOutcome, StoreError> {
        let batch_id = &job.batch_id;
        let categories = self.store.categories_for_batch(batch_id).await?;

        if categories.is_empty() {
            if self.store.get_batch(batch_id).await?.is_none() {
                warn!(batch_id = %batch_id, "batch not found, discarding forecast job");
            } else {
                info!(batch_id = %batch_id, "batch wrote no facts, nothing to forecast");
            }
            return Ok(EngineOutcome::default());
        }

        let mut outcome = EngineOutcome::default();
        for category in &categories {
            match self.forecast_category(batch_id, category).await {
                Ok(0) => outcome.categories_skipped += 1,
                Ok(written) => {
                    outcome.categories_processed += 1;
                    outcome.records_written += written;
                }
                Err(e) => {
                    // Other categories still get their forecasts.
                    warn!(
                        batch_id = %batch_id,
                        category = %category,
                        error = %e,
                        "category forecast failed"
                    );
                    outcome.categories_skipped += 1;
                }
            }
        }

        info!(
            batch_id = %batch_id,
            processed = outcome.categories_processed,
            skipped = outcome.categories_skipped,
            records = outcome.records_written,
            "forecast job finished"
        );
        Ok(outcome)
    }

    /// Run all models for one category and upsert in one transaction.
    /// Returns the number of records written; 0 means the category was
    /// skipped for lack of history.
    async fn forecast_category(
        &self,
        batch_id: &str,
        category: &str,
    ) -> Result<usize, StoreError> {
        let series = self.store.category_daily_series(category).await?;
        if series.len() < MIN_HISTORY_DAYS {
            info!(
                category = %category,
                days = series.len(),
                "insufficient history, skipping category"
            );
            return Ok(0);
        }

        let history: Vec<f64> = series.iter().map(|p| p.sales).collect();
        let last_date = series[series.len() - 1].date;
        let horizon = self.horizon_days as usize;
        let now = Utc::now();

        let mut records = Vec::with_capacity(horizon * ModelKind::ALL.len());
        for kind in ModelKind::ALL {
            let mut model = model_for(kind);
            let run = model
                .fit(&history)
                .and_then(|()| model.forecast(horizon, self.confidence_level));
            let output = match run {
                Ok(output) => output,
                Err(e) => {
                    warn!(category = %category, model = %kind, error = %e, "model failed");
                    continue;
                }
            };

            for (h, &value) in output.values.iter().enumerate() {
                let forecast_date = last_date + Days::new(h as u64 + 1);
                records.push(ForecastRecord {
                    forecast_date,
                    category: category.to_string(),
                    model_type: kind,
                    forecast_value: value,
                    lower_bound: output.bounds.as_ref().map(|b| b.lower[h]),
                    upper_bound: output.bounds.as_ref().map(|b| b.upper[h]),
                    batch_id: batch_id.to_string(),
                    created_at: now,
                });
            }
        }

        if !records.is_empty() {
            self.store.upsert_forecasts(&records).await?;
        }
        Ok(records.len())
    }
}
