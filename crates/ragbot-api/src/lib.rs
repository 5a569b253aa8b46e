//! JSON and WebSocket API for RAGBot.
//!
//! Exposes an axum [`Router`] over a [`Pipeline`]. Callers are identified by
//! a header set by the authenticating proxy in front of the service (see
//! [`identity`]); TLS and authentication proper are the deployment's concern.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `GET` | `/doc` | [`documents::list`] |
//! | `PUT` | `/upload/{fileName}` | [`upload::handler`] |
//! | `POST` | `/doc/{documentId}` | [`conversations::create`] |
//! | `GET` | `/doc/{documentId}/{conversationId}` | [`conversations::get_one`] |
//! | `DELETE` | `/doc/{documentId}/{conversationId}` | [`conversations::delete`] |
//! | `POST` | `/ask` | [`ask::handler`] |
//! | `GET` | `/ws` | [`ws::handler`] |

pub mod ask;
pub mod conversations;
pub mod documents;
pub mod error;
pub mod identity;
pub mod registry;
pub mod upload;
pub mod ws;


use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  http::HeaderName,
  routing::{get, post, put},
};
use ragbot_core::{job::ObjectCreated, store::RecordStore};
use ragbot_pipeline::Pipeline;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::ApiError;
pub use identity::Identity;
pub use registry::{ConnectionRegistry, ServerMessage};

pub const DEFAULT_IDENTITY_HEADER: &str = "x-ragbot-user";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub pipeline:         Pipeline<S>,
  /// Upload notifications for the ingestion listener.
  pub uploads:          mpsc::Sender<ObjectCreated>,
  pub registry:         Arc<ConnectionRegistry>,
  pub identity_header:  HeaderName,
  pub max_upload_bytes: usize,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      pipeline:         self.pipeline.clone(),
      uploads:          self.uploads.clone(),
      registry:         Arc::clone(&self.registry),
      identity_header:  self.identity_header.clone(),
      max_upload_bytes: self.max_upload_bytes,
    }
  }
}

impl<S: RecordStore> AppState<S> {
  /// State with the default identity header and upload limit. `registry`
  /// should be the same registry the pipeline fans answers out through.
  pub fn new(
    pipeline: Pipeline<S>,
    uploads: mpsc::Sender<ObjectCreated>,
    registry: Arc<ConnectionRegistry>,
  ) -> Self {
    Self {
      pipeline,
      uploads,
      registry,
      identity_header: HeaderName::from_static(DEFAULT_IDENTITY_HEADER),
      max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
    }
  }

  pub fn with_identity_header(mut self, header: HeaderName) -> Self {
    self.identity_header = header;
    self
  }

  pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
    self.max_upload_bytes = limit;
    self
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: RecordStore + 'static,
{
  let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

  Router::new()
    // Documents and conversations
    .route("/doc", get(documents::list::<S>))
    .route("/doc/{document_id}", post(conversations::create::<S>))
    .route(
      "/doc/{document_id}/{conversation_id}",
      get(conversations::get_one::<S>).delete(conversations::delete::<S>),
    )
    // Uploads
    .route("/upload/{file_name}", put(upload::handler::<S>).layer(upload_limit))
    // Answers
    .route("/ask", post(ask::handler::<S>))
    .route("/ws", get(ws::handler::<S>))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}
