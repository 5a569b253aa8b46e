//! RAGBot server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) under the
//! `RAGBOT_` environment, opens the SQLite record store and the blob store,
//! starts the ingestion listener and the indexing workers, and serves the
//! JSON/WebSocket API over HTTP.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use ragbot_pipeline::worker::{run_ingestion_listener, spawn_indexing_workers};
use ragbot_server::{Assembled, LogFormat, ServerConfig, assemble};
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "RAGBot document Q&A server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  let cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
  init_tracing(cfg.log_format);

  let Assembled { router, pipeline, uploads } = assemble(&cfg).await?;

  let listener_task = tokio::spawn(run_ingestion_listener(pipeline.clone(), uploads));
  let workers = spawn_indexing_workers(&pipeline, cfg.indexing_workers);
  info!(workers = workers.len(), "background stages started");

  let address = cfg.address();
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  info!("Listening on http://{address}");

  axum::serve(listener, router)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  listener_task.abort();
  for worker in workers {
    worker.abort();
  }
  info!("shut down");
  Ok(())
}

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();
  let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
  match format {
    LogFormat::Json => subscriber.json().init(),
    LogFormat::Text => subscriber.init(),
  }
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "could not listen for shutdown signal");
    std::future::pending::<()>().await;
  }
}
