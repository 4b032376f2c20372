//! Domain types shared across the tidecast crates.
//!
//! The three persisted entities (upload batches, fact records, forecast
//! records) plus the queue job payloads that move batches between the
//! pipeline stages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Queue channel carrying ingestion jobs (gateway → ingest worker).
pub const INGEST_CHANNEL: &str = "ingest_jobs";

/// Queue channel carrying forecast jobs (ingest worker → forecast worker).
pub const FORECAST_CHANNEL: &str = "forecast_jobs";

// ── Batch lifecycle ─────────────────────────────────────────────────

/// Processing state of an upload batch.
///
/// `uploaded → processing → {completed | failed}`. Both end states are
/// terminal; a failed batch is re-submitted as a new batch, never retried
/// in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Uploaded => "uploaded",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(BatchStatus::Uploaded),
            "processing" => Ok(BatchStatus::Processing),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(format!("unknown batch status '{other}'")),
        }
    }
}

/// Metadata row for one submitted dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadBatch {
    pub batch_id: String,
    pub original_filename: String,
    pub stored_filename: String,
    /// SHA-256 of the uploaded content, unique across all batches.
    pub file_hash: String,
    pub status: BatchStatus,
    pub num_total_rows: i64,
    pub num_missing_rows: i64,
    pub num_imputed_rows: i64,
    pub num_inserted_rows: i64,
    pub num_updated_rows: i64,
    pub error_log: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    /// Set when the pipeline takes the batch; drives the stale-batch sweep.
    pub processing_started_at: Option<DateTime<Utc>>,
}

/// Row tallies produced by a successful ingestion, persisted on the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounters {
    pub total: i64,
    pub missing: i64,
    pub imputed: i64,
    pub inserted: i64,
    pub updated: i64,
}

// ── Facts ───────────────────────────────────────────────────────────

/// One normalized dataset row, ready for upsert. Identity is
/// (date, product_id, category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub date: NaiveDate,
    pub product_id: String,
    pub category: String,
    pub sales: f64,
    pub is_imputed: bool,
}

/// A persisted fact with version and provenance.
///
/// Exactly one record exists per (date, product_id, category); `version`
/// starts at 1 and increments by 1 on every overwrite, whichever batch
/// performs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRecord {
    pub date: NaiveDate,
    pub product_id: String,
    pub category: String,
    pub sales: f64,
    pub is_imputed: bool,
    pub batch_id: String,
    pub file_hash: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Forecasts ───────────────────────────────────────────────────────

/// The interchangeable forecasting algorithms. The string form is what is
/// persisted in `forecast_records.model_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Baseline,
    HoltWinters,
    SeasonalAr,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::Baseline,
        ModelKind::HoltWinters,
        ModelKind::SeasonalAr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Baseline => "baseline",
            ModelKind::HoltWinters => "holt_winters",
            ModelKind::SeasonalAr => "seasonal_ar",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(ModelKind::Baseline),
            "holt_winters" => Ok(ModelKind::HoltWinters),
            "seasonal_ar" => Ok(ModelKind::SeasonalAr),
            other => Err(format!("unknown model type '{other}'")),
        }
    }
}

/// One predicted daily point for a (date, category, model) identity.
/// Recomputation overwrites value/bounds/provenance in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub forecast_date: NaiveDate,
    pub category: String,
    pub model_type: ModelKind,
    pub forecast_value: f64,
    /// Absent when the model cannot produce an interval.
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
}

/// One daily point of a category's aggregated history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub sales: f64,
}

// ── Job payloads ────────────────────────────────────────────────────

/// Payload on the `ingest_jobs` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestJob {
    pub batch_id: String,
    pub stored_filename: String,
}

/// Payload on the `forecast_jobs` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastJob {
    pub batch_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_status_roundtrip() {
        for s in ["uploaded", "processing", "completed", "failed"] {
            let parsed: BatchStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("done".parse::<BatchStatus>().is_err());
    }

    #[test]
    fn test_batch_status_terminality() {
        assert!(!BatchStatus::Uploaded.is_terminal());
        assert!(!BatchStatus::Processing.is_terminal());
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
    }

    #[test]
    fn test_model_kind_strings() {
        assert_eq!(ModelKind::Baseline.to_string(), "baseline");
        assert_eq!(ModelKind::HoltWinters.to_string(), "holt_winters");
        assert_eq!(ModelKind::SeasonalAr.to_string(), "seasonal_ar");
        for kind in ModelKind::ALL {
            assert_eq!(kind.as_str().parse::<ModelKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_ingest_job_serde() {
        let job = IngestJob {
            batch_id: "sales_1704067200_a1b2c3".to_string(),
            stored_filename: "sales_1704067200_deadbeef.csv".to_string(),
        };
        let json = serde_json::to_string(&job).unwrap();
        let back: IngestJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_forecast_job_serde() {
        let json = r#"{"batch_id":"b-1"}"#;
        let job: ForecastJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.batch_id, "b-1");
    }
}
