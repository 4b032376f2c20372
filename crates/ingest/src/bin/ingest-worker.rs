//! ingest-worker — consumes upload jobs and runs the ingestion pipeline.
//!
//! Blocking-pops `IngestJob`s from the ingest channel, validates and
//! imputes the uploaded CSV, upserts facts in one transaction, and
//! hands completed batches to the forecast channel.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Notify;
use tracing::info;

use tidecast_core::config::{load_dotenv, Config};
use tidecast_ingest::worker::{wait_for_services, IngestWorker};
use tidecast_ingest::IngestionPipeline;
use tidecast_queue::RedisQueue;
use tidecast_store::PgStore;

/// Sales data ingestion worker.
#[derive(Parser, Debug)]
#[command(name = "ingest-worker", version, about)]
struct Cli {
    /// Override the upload directory the server writes into.
    #[arg(long, env = "UPLOAD_DIR")]
    upload_dir: Option<String>,

    /// Override the blocking-dequeue timeout in seconds.
    #[arg(long)]
    poll_timeout_secs: Option<u64>,
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

    let upload_dir = cli
        .upload_dir
        .map(Into::into)
        .unwrap_or_else(|| config.server.upload_dir.clone());

    let queue = Arc::new(RedisQueue::connect(&config.queue.url).await?);
    let store = Arc::new(PgStore::connect(&config.postgres).await?);

    wait_for_services(store.as_ref(), queue.as_ref(), &config.worker).await?;

    let pipeline = IngestionPipeline::new(store.clone(), queue.clone(), upload_dir);
    let worker = IngestWorker::new(
        store,
        queue,
        pipeline,
        Duration::from_secs(
            cli.poll_timeout_secs
                .unwrap_or(config.queue.poll_timeout_secs),
        ),
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

    info!("ingest-worker starting");
    worker.run(shutdown).await;
    info!("ingest-worker exited cleanly");
    Ok(())
}
