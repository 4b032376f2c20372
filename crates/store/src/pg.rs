//! PostgreSQL backend.
//!
//! One `PgPool` per process; migrations run at connect time. Fact upserts
//! use a single `INSERT ... ON CONFLICT DO UPDATE` per row inside the batch
//! transaction, so a key conflict can never abort the enclosing
//! transaction. Insert-vs-update is read back from `xmax = 0` on the
//! returned row.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use tidecast_core::config::PostgresConfig;
use tidecast_core::model::{
    BatchStatus, FactRecord, FactRow, ForecastRecord, ModelKind, RowCounters, SeriesPoint,
    UploadBatch,
};

use crate::error::StoreError;
use crate::store::{FactFilter, ForecastFilter, TimeSeriesStore, DEFAULT_LIST_LIMIT};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url())
            .await?;
        info!(host = %config.host, db = %config.database, "PostgreSQL connected");

        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("database migrations applied");

        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, shared wiring).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn batch_from_row(row: &PgRow) -> Result<UploadBatch, StoreError> {
    let status: String = row.try_get("status")?;
    let status: BatchStatus = status.parse().map_err(StoreError::Query)?;
    Ok(UploadBatch {
        batch_id: row.try_get("batch_id")?,
        original_filename: row.try_get("original_filename")?,
        stored_filename: row.try_get("stored_filename")?,
        file_hash: row.try_get("file_hash")?,
        status,
        num_total_rows: row.try_get("num_total_rows")?,
        num_missing_rows: row.try_get("num_missing_rows")?,
        num_imputed_rows: row.try_get("num_imputed_rows")?,
        num_inserted_rows: row.try_get("num_inserted_rows")?,
        num_updated_rows: row.try_get("num_updated_rows")?,
        error_log: row.try_get("error_log")?,
        uploaded_at: row.try_get("uploaded_at")?,
        processing_started_at: row.try_get("processing_started_at")?,
    })
}

fn fact_from_row(row: &PgRow) -> Result<FactRecord, StoreError> {
    Ok(FactRecord {
        date: row.try_get("date")?,
        product_id: row.try_get("product_id")?,
        category: row.try_get("category")?,
        sales: row.try_get("sales")?,
        is_imputed: row.try_get("is_imputed")?,
        batch_id: row.try_get("batch_id")?,
        file_hash: row.try_get("file_hash")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn forecast_from_row(row: &PgRow) -> Result<ForecastRecord, StoreError> {
    let model: String = row.try_get("model_type")?;
    let model_type: ModelKind = model.parse().map_err(StoreError::Query)?;
    Ok(ForecastRecord {
        forecast_date: row.try_get("forecast_date")?,
        category: row.try_get("category")?,
        model_type,
        forecast_value: row.try_get("forecast_value")?,
        lower_bound: row.try_get("lower_bound")?,
        upper_bound: row.try_get("upper_bound")?,
        batch_id: row.try_get("batch_id")?,
        created_at: row.try_get("created_at")?,
    })
}

const BATCH_COLUMNS: &str = "batch_id, original_filename, stored_filename, file_hash, status,
     num_total_rows, num_missing_rows, num_imputed_rows, num_inserted_rows, num_updated_rows,
     error_log, uploaded_at, processing_started_at";

#[async_trait]
impl TimeSeriesStore for PgStore {
    // ── Batches ─────────────────────────────────────────────────

    async fn create_batch(&self, batch: &UploadBatch) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO upload_batches
                 (batch_id, original_filename, stored_filename, file_hash, status, uploaded_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&batch.batch_id)
        .bind(&batch.original_filename)
        .bind(&batch.stored_filename)
        .bind(&batch.file_hash)
        .bind(batch.status.as_str())
        .bind(batch.uploaded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> Result<Option<UploadBatch>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM upload_batches WHERE batch_id = $1"
        ))
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    async fn find_batch_by_hash(
        &self,
        file_hash: &str,
    ) -> Result<Option<UploadBatch>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM upload_batches WHERE file_hash = $1"
        ))
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    async fn list_batches(&self, limit: i64) -> Result<Vec<UploadBatch>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM upload_batches ORDER BY uploaded_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(batch_from_row).collect()
    }

    async fn set_batch_processing(&self, batch_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE upload_batches
             SET status = 'processing', processing_started_at = now()
             WHERE batch_id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_batch_failed(&self, batch_id: &str, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE upload_batches
             SET status = 'failed', error_log = $2
             WHERE batch_id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(batch_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_batch_completed(
        &self,
        batch_id: &str,
        counters: RowCounters,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE upload_batches
             SET status = 'completed',
                 num_total_rows = $2,
                 num_missing_rows = $3,
                 num_imputed_rows = $4,
                 num_inserted_rows = $5,
                 num_updated_rows = $6,
                 error_log = NULL
             WHERE batch_id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(batch_id)
        .bind(counters.total)
        .bind(counters.missing)
        .bind(counters.imputed)
        .bind(counters.inserted)
        .bind(counters.updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_stale_processing(
        &self,
        older_than: Duration,
    ) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "UPDATE upload_batches
             SET status = 'failed',
                 error_log = 'processing worker lost; re-submit the file as a new batch'
             WHERE status = 'processing'
               AND processing_started_at < now() - make_interval(secs => $1)
             RETURNING batch_id",
        )
        .bind(older_than.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| r.try_get("batch_id").map_err(StoreError::from))
            .collect()
    }

    // ── Facts ───────────────────────────────────────────────────

    async fn apply_fact_rows(
        &self,
        batch_id: &str,
        file_hash: &str,
        rows: &[FactRow],
    ) -> Result<(i64, i64), StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0i64;
        let mut updated = 0i64;

        for row in rows {
            // xmax = 0 only on a freshly inserted row version.
            let was_insert: bool = sqlx::query_scalar(
                "INSERT INTO fact_records
                     (date, product_id, category, sales, is_imputed, batch_id, file_hash, version)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
                 ON CONFLICT (date, product_id, category) DO UPDATE SET
                     sales = EXCLUDED.sales,
                     is_imputed = EXCLUDED.is_imputed,
                     batch_id = EXCLUDED.batch_id,
                     file_hash = EXCLUDED.file_hash,
                     version = fact_records.version + 1,
                     updated_at = now()
                 RETURNING (xmax = 0)",
            )
            .bind(row.date)
            .bind(&row.product_id)
            .bind(&row.category)
            .bind(row.sales)
            .bind(row.is_imputed)
            .bind(batch_id)
            .bind(file_hash)
            .fetch_one(&mut *tx)
            .await?;

            if was_insert {
                inserted += 1;
            } else {
                updated += 1;
            }
        }

        tx.commit().await?;
        Ok((inserted, updated))
    }

    async fn list_facts(&self, filter: &FactFilter) -> Result<Vec<FactRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT date, product_id, category, sales, is_imputed, batch_id, file_hash,
                    version, created_at, updated_at
             FROM fact_records
             WHERE ($1::text IS NULL OR category = $1)
               AND ($2::date IS NULL OR date >= $2)
               AND ($3::date IS NULL OR date <= $3)
             ORDER BY date DESC, product_id, category
             LIMIT $4",
        )
        .bind(&filter.category)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(fact_from_row).collect()
    }

    async fn categories_for_batch(&self, batch_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT category FROM fact_records WHERE batch_id = $1 ORDER BY category",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| r.try_get("category").map_err(StoreError::from))
            .collect()
    }

    async fn category_daily_series(
        &self,
        category: &str,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT date, SUM(sales) AS sales
             FROM fact_records
             WHERE category = $1
             GROUP BY date
             ORDER BY date",
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(SeriesPoint {
                    date: r.try_get("date")?,
                    sales: r.try_get("sales")?,
                })
            })
            .collect()
    }

    // ── Forecasts ───────────────────────────────────────────────

    async fn upsert_forecasts(&self, records: &[ForecastRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO forecast_records
                     (forecast_date, category, model_type, forecast_value,
                      lower_bound, upper_bound, batch_id, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, now())
                 ON CONFLICT (forecast_date, category, model_type) DO UPDATE SET
                     forecast_value = EXCLUDED.forecast_value,
                     lower_bound = EXCLUDED.lower_bound,
                     upper_bound = EXCLUDED.upper_bound,
                     batch_id = EXCLUDED.batch_id,
                     created_at = now()",
            )
            .bind(record.forecast_date)
            .bind(&record.category)
            .bind(record.model_type.as_str())
            .bind(record.forecast_value)
            .bind(record.lower_bound)
            .bind(record.upper_bound)
            .bind(&record.batch_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_forecasts(
        &self,
        filter: &ForecastFilter,
    ) -> Result<Vec<ForecastRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT forecast_date, category, model_type, forecast_value,
                    lower_bound, upper_bound, batch_id, created_at
             FROM forecast_records
             WHERE ($1::text IS NULL OR category = $1)
               AND ($2::text IS NULL OR model_type = $2)
               AND ($3::date IS NULL OR forecast_date >= $3)
               AND ($4::date IS NULL OR forecast_date <= $4)
             ORDER BY forecast_date DESC, category, model_type
             LIMIT $5",
        )
        .bind(&filter.category)
        .bind(filter.model_type.map(|m| m.as_str()))
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(forecast_from_row).collect()
    }

    // ── Health ──────────────────────────────────────────────────

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
