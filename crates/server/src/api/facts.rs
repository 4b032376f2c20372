use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use tidecast_core::model::FactRecord;
use tidecast_store::FactFilter;

use super::{internal_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FactsResponse {
    pub count: usize,
    pub facts: Vec<FactRecord>,
}

/// `GET /facts?category&start_date&end_date&limit` — committed facts
/// only; a batch mid-transaction is invisible here.
pub async fn facts_list(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<FactFilter>,
) -> ApiResult<Json<FactsResponse>> {
    let facts = state
        .store
        .list_facts(&filter)
        .await
        .map_err(internal_error)?;
    Ok(Json(FactsResponse {
        count: facts.len(),
        facts,
    }))
}
