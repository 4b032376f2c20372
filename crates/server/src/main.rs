//! tidecast-server — upload gateway and read API.
//!
//! Accepts CSV uploads, records batches, and hands ingestion off to the
//! worker fleet through the job queue. Serves committed facts and
//! forecasts back out.

mod api;
mod router;
mod state;

use std::sync::Arc;

use tracing::info;

use tidecast_core::config::{load_dotenv, Config};
use tidecast_queue::RedisQueue;
use tidecast_store::PgStore;

use crate::router::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    tokio::fs::create_dir_all(&config.server.upload_dir).await?;

    let queue = Arc::new(RedisQueue::connect(&config.queue.url).await?);
    let store = Arc::new(PgStore::connect(&config.postgres).await?);

    let state = Arc::new(AppState {
        store,
        queue,
        upload_dir: config.server.upload_dir.clone(),
    });
    let app = build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "tidecast-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
