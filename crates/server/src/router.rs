//! HTTP router construction.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::api;
use crate::state::AppState;

/// Upload size cap: 50 MiB.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

fn cors_layer(cors_origin: &str) -> CorsLayer {
    if cors_origin == "*" {
        return CorsLayer::permissive();
    }
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new().allow_origin(AllowOrigin::exact(origin)),
        Err(_) => CorsLayer::permissive(),
    }
}

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/upload", post(api::upload))
        .route("/batches", get(api::batches_list))
        .route("/facts", get(api::facts_list))
        .route("/forecasts", get(api::forecasts_list))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}
