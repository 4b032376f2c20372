use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use tidecast_core::model::UploadBatch;

use super::{internal_error, ApiResult};
use crate::state::AppState;

const RECENT_BATCHES: i64 = 100;

#[derive(Debug, Serialize)]
pub struct BatchesResponse {
    pub batches: Vec<UploadBatch>,
}

/// `GET /batches` — the most recent batches, newest first.
pub async fn batches_list(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<BatchesResponse>> {
    let batches = state
        .store
        .list_batches(RECENT_BATCHES)
        .await
        .map_err(internal_error)?;
    Ok(Json(BatchesResponse { batches }))
}
