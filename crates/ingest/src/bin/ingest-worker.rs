//! ingest-worker — runs the Ingestion Orchestrator's Extract/Chunk/Embed/Archive
//! stage handlers on a `pdfchat-broker` worker pool.
//!
//! Each stage is dispatched as its own Message (`ingest.extract`, `ingest.chunk`,
//! `ingest.embed_batch`, `ingest.archive`); a failing stage is retried with backoff by
//! the broker rather than in-process, so a crashed worker loses no in-flight work.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pdfchat_broker::{Broker, ShutdownHandle};
use pdfchat_core::Config;
use pdfchat_ingest::{register_handlers, submit, IngestState, JobStore};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ingest-worker", version, about)]
struct Cli {
    /// Submit a single PDF for ingestion on startup, then keep running as a worker.
    #[arg(long)]
    submit: Option<String>,

    /// Directory archived source files are moved into after a successful ingest.
    #[arg(long, env = "INGEST_ARCHIVE_DIR")]
    archive_dir: Option<String>,

    /// Grace period for in-flight handlers to finish during shutdown.
    #[arg(long, env = "INGEST_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    pdfchat_core::config::load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    let broker = Arc::new(Broker::connect(&config.redis.url, config.broker.clone()).await?);

    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let job_conn = redis_client.get_connection_manager().await?;
    let jobs = JobStore::new(job_conn, config.broker.default_ttl_secs);

    let archive_dir = cli.archive_dir.map(PathBuf::from);
    let state = Arc::new(IngestState::new(
        jobs,
        &config.clients,
        &config.embedding,
        config.chunk.clone(),
        archive_dir,
    ));

    register_handlers(&broker, state.clone()).await;
    broker.start().await;
    info!("ingest-worker started, pool_size={}", config.broker.worker_pool_size);

    if let Some(path) = &cli.submit {
        match submit(&broker, &state, path).await {
            Ok(job_id) => info!(%job_id, path, "submitted ingestion job"),
            Err(e) => error!(error = %e, path, "failed to submit ingestion job"),
        }
    }

    let shutdown = ShutdownHandle::new();
    let _signal_listener = shutdown.spawn_signal_listener();
    shutdown.wait().await;

    info!("ingest-worker shutting down");
    broker.stop(Duration::from_secs(cli.shutdown_timeout)).await;
    info!("ingest-worker exited cleanly");
    Ok(())
}
