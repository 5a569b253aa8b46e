//! The RAGBot processing stages.
//!
//! A [`Pipeline`] owns a [`RecordStore`] and the collaborator set in
//! [`Services`], and exposes one async method per stage:
//!
//! | Stage | Method |
//! |-------|--------|
//! | Document ingestion | [`Pipeline::ingest`] |
//! | Indexing | [`Pipeline::index`] |
//! | Conversation management | [`Pipeline::create_conversation`], [`Pipeline::get_conversation`], [`Pipeline::list_documents`] |
//! | Query/answer | [`Pipeline::ask`] |
//! | Deletion | [`Pipeline::delete`] |
//!
//! [`worker`] drives ingestion and indexing from their triggers.

pub mod answer;
pub mod config;
pub mod conversations;
pub mod deletion;
pub mod indexing;
pub mod ingest;
pub mod worker;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use std::sync::Arc;

use ragbot_core::{
  Error,
  blob::BlobStore,
  embed::Embedder,
  fanout::Fanout,
  ids::IdGenerator,
  llm::CompletionModel,
  pdf::PdfReader,
  queue::JobQueue,
  store::RecordStore,
};

pub use answer::{Answer, Question, Source};
pub use config::PipelineConfig;
pub use conversations::ConversationView;
pub use indexing::IndexOutcome;

/// The external collaborators every stage may call.
#[derive(Clone)]
pub struct Services {
  pub blobs:    Arc<dyn BlobStore>,
  pub queue:    Arc<dyn JobQueue>,
  pub fanout:   Arc<dyn Fanout>,
  pub pdf:      Arc<dyn PdfReader>,
  pub embedder: Arc<dyn Embedder>,
  pub llm:      Arc<dyn CompletionModel>,
  pub ids:      Arc<dyn IdGenerator>,
}

/// Stage runner over a record store `S`.
pub struct Pipeline<S> {
  store:    Arc<S>,
  services: Services,
  config:   PipelineConfig,
}

impl<S> Clone for Pipeline<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      services: self.services.clone(),
      config:   self.config.clone(),
    }
  }
}

impl<S: RecordStore> Pipeline<S> {
  pub fn new(store: Arc<S>, services: Services, config: PipelineConfig) -> Self {
    Self { store, services, config }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn services(&self) -> &Services { &self.services }

  pub fn config(&self) -> &PipelineConfig { &self.config }
}

/// Wrap a record-store failure in the shared taxonomy.
pub(crate) fn store_err<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::unavailable("record store", e)
}

/// Run a [`PdfReader`] call on the blocking pool.
pub(crate) async fn read_pdf<T, F>(
  pdf: &Arc<dyn PdfReader>,
  bytes: bytes::Bytes,
  f: F,
) -> ragbot_core::Result<T>
where
  T: Send + 'static,
  F: FnOnce(&dyn PdfReader, &[u8]) -> ragbot_core::Result<T> + Send + 'static,
{
  let pdf = Arc::clone(pdf);
  tokio::task::spawn_blocking(move || f(pdf.as_ref(), &bytes))
    .await
    .map_err(|e| Error::unavailable("pdf reader", e))?
}

#[cfg(test)]
mod tests;
