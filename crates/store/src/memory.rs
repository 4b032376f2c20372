//! In-memory backend.
//!
//! BTreeMap-backed store for tests and single-process runs. Emulates the
//! Postgres backend's atomicity: `apply_fact_rows` stages the whole batch
//! before touching shared state, so a failure leaves nothing behind.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;

use tidecast_core::model::{
    BatchStatus, FactRecord, FactRow, ForecastRecord, RowCounters, SeriesPoint, UploadBatch,
};

use crate::error::StoreError;
use crate::store::{FactFilter, ForecastFilter, TimeSeriesStore, DEFAULT_LIST_LIMIT};

type FactKey = (NaiveDate, String, String);
type ForecastKey = (NaiveDate, String, String);

#[derive(Default)]
struct Inner {
    batches: BTreeMap<String, UploadBatch>,
    facts: BTreeMap<FactKey, FactRecord>,
    forecasts: BTreeMap<ForecastKey, ForecastRecord>,
}

/// In-memory time-series store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    fail_fact_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `apply_fact_rows` calls fail without side effects,
    /// simulating a lost connection mid-batch.
    pub fn fail_fact_writes(&self, fail: bool) {
        self.fail_fact_writes.store(fail, Ordering::SeqCst);
    }

    /// Direct read of a fact, for assertions.
    pub async fn get_fact(
        &self,
        date: NaiveDate,
        product_id: &str,
        category: &str,
    ) -> Option<FactRecord> {
        let inner = self.inner.lock().await;
        inner
            .facts
            .get(&(date, product_id.to_string(), category.to_string()))
            .cloned()
    }

    pub async fn fact_count(&self) -> usize {
        self.inner.lock().await.facts.len()
    }

    pub async fn forecast_count(&self) -> usize {
        self.inner.lock().await.forecasts.len()
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryStore {
    // ── Batches ─────────────────────────────────────────────────

    async fn create_batch(&self, batch: &UploadBatch) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.batches.contains_key(&batch.batch_id) {
            return Err(StoreError::Duplicate(batch.batch_id.clone()));
        }
        if inner.batches.values().any(|b| b.file_hash == batch.file_hash) {
            return Err(StoreError::Duplicate(batch.file_hash.clone()));
        }
        inner.batches.insert(batch.batch_id.clone(), batch.clone());
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> Result<Option<UploadBatch>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.batches.get(batch_id).cloned())
    }

    async fn find_batch_by_hash(
        &self,
        file_hash: &str,
    ) -> Result<Option<UploadBatch>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .batches
            .values()
            .find(|b| b.file_hash == file_hash)
            .cloned())
    }

    async fn list_batches(&self, limit: i64) -> Result<Vec<UploadBatch>, StoreError> {
        let inner = self.inner.lock().await;
        let mut batches: Vec<_> = inner.batches.values().cloned().collect();
        batches.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        batches.truncate(limit.max(0) as usize);
        Ok(batches)
    }

    async fn set_batch_processing(&self, batch_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.batches.get_mut(batch_id) {
            Some(batch) if !batch.status.is_terminal() => {
                batch.status = BatchStatus::Processing;
                batch.processing_started_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_batch_failed(&self, batch_id: &str, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(batch) = inner.batches.get_mut(batch_id) {
            if !batch.status.is_terminal() {
                batch.status = BatchStatus::Failed;
                batch.error_log = Some(error.to_string());
            }
        }
        Ok(())
    }

    async fn mark_batch_completed(
        &self,
        batch_id: &str,
        counters: RowCounters,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(batch) = inner.batches.get_mut(batch_id) {
            if !batch.status.is_terminal() {
                batch.status = BatchStatus::Completed;
                batch.num_total_rows = counters.total;
                batch.num_missing_rows = counters.missing;
                batch.num_imputed_rows = counters.imputed;
                batch.num_inserted_rows = counters.inserted;
                batch.num_updated_rows = counters.updated;
                batch.error_log = None;
            }
        }
        Ok(())
    }

    async fn fail_stale_processing(
        &self,
        older_than: Duration,
    ) -> Result<Vec<String>, StoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| StoreError::Query(e.to_string()))?;
        let mut inner = self.inner.lock().await;
        let mut swept = Vec::new();
        for batch in inner.batches.values_mut() {
            if batch.status == BatchStatus::Processing
                && batch.processing_started_at.is_some_and(|t| t < cutoff)
            {
                batch.status = BatchStatus::Failed;
                batch.error_log =
                    Some("processing worker lost; re-submit the file as a new batch".to_string());
                swept.push(batch.batch_id.clone());
            }
        }
        Ok(swept)
    }

    // ── Facts ───────────────────────────────────────────────────

    async fn apply_fact_rows(
        &self,
        batch_id: &str,
        file_hash: &str,
        rows: &[FactRow],
    ) -> Result<(i64, i64), StoreError> {
        if self.fail_fact_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("injected write failure".to_string()));
        }

        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        // Stage the whole batch, then swap in: all-or-nothing.
        let mut staged: BTreeMap<FactKey, FactRecord> = BTreeMap::new();
        let mut inserted = 0i64;
        let mut updated = 0i64;

        for row in rows {
            let key = (row.date, row.product_id.clone(), row.category.clone());
            let existing = staged.get(&key).or_else(|| inner.facts.get(&key));
            let record = match existing {
                Some(prev) => {
                    updated += 1;
                    FactRecord {
                        sales: row.sales,
                        is_imputed: row.is_imputed,
                        batch_id: batch_id.to_string(),
                        file_hash: file_hash.to_string(),
                        version: prev.version + 1,
                        updated_at: now,
                        ..prev.clone()
                    }
                }
                None => {
                    inserted += 1;
                    FactRecord {
                        date: row.date,
                        product_id: row.product_id.clone(),
                        category: row.category.clone(),
                        sales: row.sales,
                        is_imputed: row.is_imputed,
                        batch_id: batch_id.to_string(),
                        file_hash: file_hash.to_string(),
                        version: 1,
                        created_at: now,
                        updated_at: now,
                    }
                }
            };
            staged.insert(key, record);
        }

        inner.facts.extend(staged);
        Ok((inserted, updated))
    }

    async fn list_facts(&self, filter: &FactFilter) -> Result<Vec<FactRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let mut facts: Vec<_> = inner
            .facts
            .values()
            .filter(|f| filter.category.as_deref().is_none_or(|c| f.category == c))
            .filter(|f| filter.start_date.is_none_or(|d| f.date >= d))
            .filter(|f| filter.end_date.is_none_or(|d| f.date <= d))
            .cloned()
            .collect();
        facts.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| a.product_id.cmp(&b.product_id))
                .then_with(|| a.category.cmp(&b.category))
        });
        facts.truncate(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(0) as usize);
        Ok(facts)
    }

    async fn categories_for_batch(&self, batch_id: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        let mut categories: Vec<String> = inner
            .facts
            .values()
            .filter(|f| f.batch_id == batch_id)
            .map(|f| f.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn category_daily_series(
        &self,
        category: &str,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        let inner = self.inner.lock().await;
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for fact in inner.facts.values().filter(|f| f.category == category) {
            *by_date.entry(fact.date).or_insert(0.0) += fact.sales;
        }
        Ok(by_date
            .into_iter()
            .map(|(date, sales)| SeriesPoint { date, sales })
            .collect())
    }

    // ── Forecasts ───────────────────────────────────────────────

    async fn upsert_forecasts(&self, records: &[ForecastRecord]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        for record in records {
            let key = (
                record.forecast_date,
                record.category.clone(),
                record.model_type.as_str().to_string(),
            );
            inner.forecasts.insert(key, record.clone());
        }
        Ok(())
    }

    async fn list_forecasts(
        &self,
        filter: &ForecastFilter,
    ) -> Result<Vec<ForecastRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let mut records: Vec<_> = inner
            .forecasts
            .values()
            .filter(|f| filter.category.as_deref().is_none_or(|c| f.category == c))
            .filter(|f| filter.model_type.is_none_or(|m| f.model_type == m))
            .filter(|f| filter.start_date.is_none_or(|d| f.forecast_date >= d))
            .filter(|f| filter.end_date.is_none_or(|d| f.forecast_date <= d))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.forecast_date.cmp(&a.forecast_date));
        records.truncate(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(0) as usize);
        Ok(records)
    }

    // ── Health ──────────────────────────────────────────────────

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidecast_core::model::ModelKind;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn batch(id: &str, hash: &str) -> UploadBatch {
        UploadBatch {
            batch_id: id.to_string(),
            original_filename: "sales.csv".to_string(),
            stored_filename: format!("{id}.csv"),
            file_hash: hash.to_string(),
            status: BatchStatus::Uploaded,
            num_total_rows: 0,
            num_missing_rows: 0,
            num_imputed_rows: 0,
            num_inserted_rows: 0,
            num_updated_rows: 0,
            error_log: None,
            uploaded_at: Utc::now(),
            processing_started_at: None,
        }
    }

    fn fact_row(d: &str, product: &str, category: &str, sales: f64) -> FactRow {
        FactRow {
            date: date(d),
            product_id: product.to_string(),
            category: category.to_string(),
            sales,
            is_imputed: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_version_progression() {
        let store = MemoryStore::new();
        let rows = vec![fact_row("2024-02-01", "P1", "A", 10.0)];
        let (ins, upd) = store.apply_fact_rows("b1", "h1", &rows).await.unwrap();
        assert_eq!((ins, upd), (1, 0));

        let rows = vec![fact_row("2024-02-01", "P1", "A", 20.0)];
        let (ins, upd) = store.apply_fact_rows("b2", "h2", &rows).await.unwrap();
        assert_eq!((ins, upd), (0, 1));

        let fact = store.get_fact(date("2024-02-01"), "P1", "A").await.unwrap();
        assert_eq!(fact.sales, 20.0);
        assert_eq!(fact.version, 2);
        assert_eq!(fact.batch_id, "b2");
        assert_eq!(store.fact_count().await, 1);
    }

    #[tokio::test]
    async fn test_apply_failure_has_no_side_effects() {
        let store = MemoryStore::new();
        store.fail_fact_writes(true);
        let rows = vec![fact_row("2024-02-01", "P1", "A", 10.0)];
        assert!(store.apply_fact_rows("b1", "h1", &rows).await.is_err());
        assert_eq!(store.fact_count().await, 0);
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let store = MemoryStore::new();
        store.create_batch(&batch("b1", "h1")).await.unwrap();
        assert!(store.set_batch_processing("b1").await.unwrap());
        store.mark_batch_failed("b1", "boom").await.unwrap();

        // A duplicate job delivery must not move the batch out of `failed`.
        assert!(!store.set_batch_processing("b1").await.unwrap());
        store
            .mark_batch_completed("b1", RowCounters::default())
            .await
            .unwrap();
        let b = store.get_batch("b1").await.unwrap().unwrap();
        assert_eq!(b.status, BatchStatus::Failed);
        assert_eq!(b.error_log.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let store = MemoryStore::new();
        store.create_batch(&batch("b1", "h1")).await.unwrap();
        let err = store.create_batch(&batch("b2", "h1")).await;
        assert!(matches!(err, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_category_daily_series_sums_and_sorts() {
        let store = MemoryStore::new();
        let rows = vec![
            fact_row("2024-01-02", "P1", "A", 5.0),
            fact_row("2024-01-01", "P1", "A", 1.0),
            fact_row("2024-01-01", "P2", "A", 2.0),
            fact_row("2024-01-01", "P1", "B", 99.0),
        ];
        store.apply_fact_rows("b1", "h1", &rows).await.unwrap();

        let series = store.category_daily_series("A").await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, date("2024-01-01"));
        assert_eq!(series[0].sales, 3.0);
        assert_eq!(series[1].sales, 5.0);
    }

    #[tokio::test]
    async fn test_list_facts_orders_ties_by_product_then_category() {
        let store = MemoryStore::new();
        let rows = vec![
            fact_row("2024-01-01", "P2", "A", 1.0),
            fact_row("2024-01-01", "P1", "B", 2.0),
            fact_row("2024-01-01", "P1", "A", 3.0),
            fact_row("2024-01-02", "P9", "Z", 4.0),
        ];
        store.apply_fact_rows("b1", "h1", &rows).await.unwrap();

        let facts = store.list_facts(&FactFilter::default()).await.unwrap();
        let keys: Vec<_> = facts
            .iter()
            .map(|f| (f.date, f.product_id.as_str(), f.category.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (date("2024-01-02"), "P9", "Z"),
                (date("2024-01-01"), "P1", "A"),
                (date("2024-01-01"), "P1", "B"),
                (date("2024-01-01"), "P2", "A"),
            ]
        );
    }

    #[tokio::test]
    async fn test_forecast_upsert_overwrites_in_place() {
        let store = MemoryStore::new();
        let mut record = ForecastRecord {
            forecast_date: date("2024-03-01"),
            category: "A".to_string(),
            model_type: ModelKind::Baseline,
            forecast_value: 10.0,
            lower_bound: None,
            upper_bound: None,
            batch_id: "b1".to_string(),
            created_at: Utc::now(),
        };
        store.upsert_forecasts(std::slice::from_ref(&record)).await.unwrap();
        record.forecast_value = 12.5;
        record.batch_id = "b2".to_string();
        store.upsert_forecasts(std::slice::from_ref(&record)).await.unwrap();

        assert_eq!(store.forecast_count().await, 1);
        let all = store.list_forecasts(&ForecastFilter::default()).await.unwrap();
        assert_eq!(all[0].forecast_value, 12.5);
        assert_eq!(all[0].batch_id, "b2");
    }

    #[tokio::test]
    async fn test_stale_processing_sweep() {
        let store = MemoryStore::new();
        store.create_batch(&batch("b1", "h1")).await.unwrap();
        store.set_batch_processing("b1").await.unwrap();
        {
            // Backdate the processing stamp past the window.
            let mut inner = store.inner.lock().await;
            inner.batches.get_mut("b1").unwrap().processing_started_at =
                Some(Utc::now() - chrono::Duration::hours(1));
        }

        let swept = store
            .fail_stale_processing(Duration::from_secs(900))
            .await
            .unwrap();
        assert_eq!(swept, vec!["b1".to_string()]);
        let b = store.get_batch("b1").await.unwrap().unwrap();
        assert_eq!(b.status, BatchStatus::Failed);
    }

    #[tokio::test]
    async fn test_fresh_processing_not_swept() {
        let store = MemoryStore::new();
        store.create_batch(&batch("b1", "h1")).await.unwrap();
        store.set_batch_processing("b1").await.unwrap();

        let swept = store
            .fail_stale_processing(Duration::from_secs(900))
            .await
            .unwrap();
        assert!(swept.is_empty());
    }
}
