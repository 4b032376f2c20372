use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use tidecast_core::model::ForecastRecord;
use tidecast_store::ForecastFilter;

use super::{internal_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ForecastsResponse {
    pub count: usize,
    pub forecasts: Vec<ForecastRecord>,
}

/// `GET /forecasts?category&model_type&start_date&end_date&limit`.
pub async fn forecasts_list(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ForecastFilter>,
) -> ApiResult<Json<ForecastsResponse>> {
    let forecasts = state
        .store
        .list_forecasts(&filter)
        .await
        .map_err(internal_error)?;
    Ok(Json(ForecastsResponse {
        count: forecasts.len(),
        forecasts,
    }))
}
