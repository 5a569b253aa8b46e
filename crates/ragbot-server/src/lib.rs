//! Assembly of the RAGBot server: configuration and wiring of the production
//! collaborators behind the API router.

pub mod config;

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use axum::{Router, http::HeaderName};
use ragbot_api::{AppState, ConnectionRegistry, api_router};
use ragbot_core::{ids::UuidIds, job::ObjectCreated};
use ragbot_pipeline::{Pipeline, Services};
use ragbot_providers::{
  ChannelQueue, FsBlobStore, LopdfReader, OpenAiChat, OpenAiEmbedder, OpenAiSettings,
};
use ragbot_store_sqlite::SqliteStore;
use tokio::sync::mpsc;
use tower_http::timeout::TimeoutLayer;

pub use config::{LogFormat, ServerConfig};

/// Everything `main` needs to run the service.
pub struct Assembled {
  pub router:   Router,
  pub pipeline: Pipeline<SqliteStore>,
  /// Upload notifications for the ingestion listener.
  pub uploads:  mpsc::Receiver<ObjectCreated>,
}

/// Open the stores, build the collaborators and the router.
pub async fn assemble(cfg: &ServerConfig) -> anyhow::Result<Assembled> {
  let store_path = config::expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let blob_root = config::expand_tilde(&cfg.blob_root);
  let blobs = FsBlobStore::open(&blob_root)
    .await
    .with_context(|| format!("failed to open blob store at {blob_root:?}"))?;

  let embedder = OpenAiEmbedder::new(with_env_api_key(cfg.embedding.clone()))
    .context("failed to build embedding client")?;
  let llm = OpenAiChat::new(with_env_api_key(cfg.completion.clone()))
    .context("failed to build completion client")?;

  let registry = Arc::new(ConnectionRegistry::new());
  let services = Services {
    blobs:    Arc::new(blobs),
    queue:    Arc::new(ChannelQueue::new(cfg.queue_capacity)),
    fanout:   registry.clone(),
    pdf:      Arc::new(LopdfReader),
    embedder: Arc::new(embedder),
    llm:      Arc::new(llm),
    ids:      Arc::new(UuidIds),
  };
  let pipeline = Pipeline::new(Arc::new(store), services, cfg.pipeline.clone());

  let identity_header = HeaderName::try_from(cfg.identity_header.as_str())
    .with_context(|| format!("invalid identity_header {:?}", cfg.identity_header))?;
  let (uploads_tx, uploads) = mpsc::channel(cfg.upload_backlog.max(1));
  let state = AppState::new(pipeline.clone(), uploads_tx, registry)
    .with_identity_header(identity_header)
    .with_max_upload_bytes(cfg.max_upload_bytes);

  let router = api_router(state)
    .layer(TimeoutLayer::new(Duration::from_secs(cfg.request_timeout_secs)));

  Ok(Assembled { router, pipeline, uploads })
}

/// Fall back to `OPENAI_API_KEY` when no key is configured.
fn with_env_api_key(mut settings: OpenAiSettings) -> OpenAiSettings {
  if settings.api_key.is_none() {
    settings.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
  }
  settings
}
