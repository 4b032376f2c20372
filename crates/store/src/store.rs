//! The `TimeSeriesStore` trait: persistence for batches, facts, and
//! forecasts with the transactional boundaries the pipeline relies on.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use tidecast_core::model::{
    FactRecord, FactRow, ForecastRecord, ModelKind, RowCounters, SeriesPoint, UploadBatch,
};

use crate::error::StoreError;

/// Filter for the committed-facts read surface.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactFilter {
    pub category: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

/// Filter for the forecast read surface.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastFilter {
    pub category: Option<String>,
    pub model_type: Option<ModelKind>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

/// Default row cap for list queries.
pub const DEFAULT_LIST_LIMIT: i64 = 1000;

/// Persistence for the three entity collections.
///
/// Transactional guarantees the implementations must provide:
/// - `apply_fact_rows` applies the whole slice in ONE transaction; readers
///   observe either the pre-batch or the fully committed post-batch state.
/// - `upsert_forecasts` is one transaction per call; the engine calls it
///   once per category, making the category the unit of mutual exclusion.
/// - Batch status updates never move a batch out of a terminal state.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    // ── Batches ─────────────────────────────────────────────────

    async fn create_batch(&self, batch: &UploadBatch) -> Result<(), StoreError>;

    async fn get_batch(&self, batch_id: &str) -> Result<Option<UploadBatch>, StoreError>;

    async fn find_batch_by_hash(&self, file_hash: &str)
        -> Result<Option<UploadBatch>, StoreError>;

    /// Most recent batches, newest first.
    async fn list_batches(&self, limit: i64) -> Result<Vec<UploadBatch>, StoreError>;

    /// Move a batch to `processing` and stamp `processing_started_at`.
    ///
    /// Returns `false` if the batch does not exist or is already terminal
    /// (a duplicate job delivery); the caller skips the job in that case.
    async fn set_batch_processing(&self, batch_id: &str) -> Result<bool, StoreError>;

    /// Terminal failure: persist the error text on the batch.
    async fn mark_batch_failed(&self, batch_id: &str, error: &str) -> Result<(), StoreError>;

    /// Terminal success: persist the row tallies.
    async fn mark_batch_completed(
        &self,
        batch_id: &str,
        counters: RowCounters,
    ) -> Result<(), StoreError>;

    /// Sweep batches stuck in `processing` longer than `older_than` to
    /// `failed`, returning the affected batch ids.
    async fn fail_stale_processing(
        &self,
        older_than: Duration,
    ) -> Result<Vec<String>, StoreError>;

    // ── Facts ───────────────────────────────────────────────────

    /// Upsert every row in one atomic transaction.
    ///
    /// An existing (date, product_id, category) identity is overwritten
    /// with `version + 1` and counts as updated; a fresh identity inserts
    /// at version 1 and counts as inserted. Returns (inserted, updated).
    async fn apply_fact_rows(
        &self,
        batch_id: &str,
        file_hash: &str,
        rows: &[FactRow],
    ) -> Result<(i64, i64), StoreError>;

    async fn list_facts(&self, filter: &FactFilter) -> Result<Vec<FactRecord>, StoreError>;

    /// Distinct categories that had at least one fact written under this
    /// batch id.
    async fn categories_for_batch(&self, batch_id: &str) -> Result<Vec<String>, StoreError>;

    /// Full daily history for a category: SUM(sales) per distinct date,
    /// ascending.
    async fn category_daily_series(
        &self,
        category: &str,
    ) -> Result<Vec<SeriesPoint>, StoreError>;

    // ── Forecasts ───────────────────────────────────────────────

    /// Upsert forecast rows keyed by (date, category, model) in one
    /// transaction, overwriting value/bounds/provenance/timestamp in place.
    async fn upsert_forecasts(&self, records: &[ForecastRecord]) -> Result<(), StoreError>;

    async fn list_forecasts(
        &self,
        filter: &ForecastFilter,
    ) -> Result<Vec<ForecastRecord>, StoreError>;

    // ── Health ──────────────────────────────────────────────────

    /// Cheap connectivity probe for startup checks and /health.
    async fn health_check(&self) -> Result<(), StoreError>;
}
