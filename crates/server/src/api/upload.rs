//! CSV upload gateway: dedup by content hash, persist the file, record
//! the batch, hand off to the ingest queue.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use tidecast_core::model::{BatchStatus, IngestJob, UploadBatch, INGEST_CHANNEL};
use tidecast_queue::client::enqueue_job;
use tidecast_store::StoreError;

use super::{bad_request, internal_error, ApiError, ErrorResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub batch_id: String,
    pub status: String,
}

/// `POST /upload` — accept one `.csv` file as multipart form data.
///
/// The file's sha256 is the dedup key: a hash already on record is
/// rejected with 409 and the existing batch id, whatever state that
/// batch is in.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .ok_or_else(|| bad_request("file field has no filename"))?
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("failed to read file: {e}")))?;
            upload = Some((filename, bytes.to_vec()));
        }
    }
    let (filename, bytes) = upload.ok_or_else(|| bad_request("missing 'file' field"))?;

    let stem = csv_stem(&filename)?;
    if bytes.is_empty() {
        return Err(bad_request("uploaded file is empty"));
    }

    let file_hash = hex::encode(Sha256::digest(&bytes));
    if let Some(existing) = state
        .store
        .find_batch_by_hash(&file_hash)
        .await
        .map_err(internal_error)?
    {
        warn!(batch_id = %existing.batch_id, "duplicate upload rejected");
        return Err(duplicate(existing.batch_id));
    }

    let unix_ts = Utc::now().timestamp();
    let stored_filename = format!("{stem}_{unix_ts}_{}.csv", &file_hash[..8]);
    let batch_id = format!(
        "{stem}_{unix_ts}_{}",
        &uuid::Uuid::new_v4().simple().to_string()[..6]
    );

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(internal_error)?;
    let path = state.upload_dir.join(&stored_filename);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(internal_error)?;

    let batch = UploadBatch {
        batch_id: batch_id.clone(),
        original_filename: filename,
        stored_filename: stored_filename.clone(),
        file_hash,
        status: BatchStatus::Uploaded,
        num_total_rows: 0,
        num_missing_rows: 0,
        num_imputed_rows: 0,
        num_inserted_rows: 0,
        num_updated_rows: 0,
        error_log: None,
        uploaded_at: Utc::now(),
        processing_started_at: None,
    };
    match state.store.create_batch(&batch).await {
        Ok(()) => {}
        Err(StoreError::Duplicate(_)) => {
            // Lost a race with an identical concurrent upload.
            let _ = tokio::fs::remove_file(&path).await;
            let existing = state
                .store
                .find_batch_by_hash(&batch.file_hash)
                .await
                .map_err(internal_error)?;
            let existing_id = existing.map(|b| b.batch_id).unwrap_or_default();
            return Err(duplicate(existing_id));
        }
        Err(e) => return Err(internal_error(e)),
    }

    enqueue_job(
        state.queue.as_ref(),
        INGEST_CHANNEL,
        &IngestJob {
            batch_id: batch_id.clone(),
            stored_filename,
        },
    )
    .await
    .map_err(internal_error)?;

    info!(batch_id = %batch_id, "upload accepted");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            batch_id,
            status: BatchStatus::Uploaded.to_string(),
        }),
    ))
}

/// Sanitized filename stem; rejects anything that is not a `.csv`.
fn csv_stem(filename: &str) -> Result<String, ApiError> {
    let lower = filename.to_ascii_lowercase();
    let stem = lower
        .strip_suffix(".csv")
        .ok_or_else(|| bad_request("only .csv files are accepted"))?;
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        return Err(bad_request("filename has no usable stem"));
    }
    Ok(cleaned)
}

fn duplicate(existing_batch_id: String) -> ApiError {
    (
        StatusCode::CONFLICT,
        axum::Json(ErrorResponse {
            error: "file already uploaded".to_string(),
            existing_batch_id: Some(existing_batch_id),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_stem_sanitizes() {
        assert_eq!(csv_stem("Weekly Sales (Q3).csv").unwrap(), "weekly_sales__q3_");
        assert_eq!(csv_stem("data-2024_v2.CSV").unwrap(), "data-2024_v2");
    }

    #[test]
    fn test_non_csv_rejected() {
        assert!(csv_stem("data.xlsx").is_err());
        assert!(csv_stem("data").is_err());
        assert!(csv_stem(".csv").is_err());
    }
}
