//! API route handlers.

pub mod batches;
pub mod facts;
pub mod forecasts;
pub mod health;
pub mod upload;

pub use batches::batches_list;
pub use facts::facts_list;
pub use forecasts::forecasts_list;
pub use health::health;
pub use upload::upload;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_batch_id: Option<String>,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);
pub(crate) type ApiResult<T> = Result<T, ApiError>;

pub(crate) fn internal_error(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
            existing_batch_id: None,
        }),
    )
}

pub(crate) fn bad_request(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: msg.into(),
            existing_batch_id: None,
        }),
    )
}
