//! forecast-worker — consumes completed-batch jobs and writes forecasts.
//!
//! For every category a batch touched, runs the configured model set
//! over the category's full daily history and upserts `horizon` future
//! points per model.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Notify;
use tracing::info;

use tidecast_core::config::{load_dotenv, Config};
use tidecast_forecast::engine::ForecastEngine;
use tidecast_forecast::worker::{wait_for_services, ForecastWorker};
use tidecast_queue::RedisQueue;
use tidecast_store::PgStore;

/// Sales forecasting worker.
#[derive(Parser, Debug)]
#[command(name = "forecast-worker", version, about)]
struct Cli {
    /// Override the forecast horizon in days.
    #[arg(long, env = "FORECAST_HORIZON_DAYS")]
    horizon_days: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    let horizon = cli.horizon_days.unwrap_or(config.forecast.horizon_days);

    let queue = Arc::new(RedisQueue::connect(&config.queue.url).await?);
    let store = Arc::new(PgStore::connect(&config.postgres).await?);

    wait_for_services(store.as_ref(), queue.as_ref(), &config.worker).await?;

    let engine = ForecastEngine::new(store, horizon, config.forecast.confidence_level);
    let worker = ForecastWorker::new(
        queue,
        engine,
        Duration::from_secs(config.queue.poll_timeout_secs),
        &config.worker,
    );

    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            shutdown_signal.notify_one();
        }
    });

    info!("forecast-worker starting");
    worker.run(shutdown).await;
    info!("forecast-worker exited cleanly");
    Ok(())
}
