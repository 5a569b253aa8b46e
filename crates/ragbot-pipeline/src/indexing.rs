//! Indexing: build and publish the vector index for one uploaded document.
//!
//! A run reads the upload, chunks its page text, embeds every chunk and
//! stores a new index build. The build becomes visible only when the
//! manifest naming it is written; the document is marked READY after that.
//! Any failure leaves the document at PROCESSING for the worker to retry.

use chrono::Utc;
use ragbot_core::{
  Error, Result,
  blob::BlobStore,
  chunk::Splitter,
  document::DocStatus,
  index::{FlatIndex, IndexManifest},
  job::IndexingJob,
  keys::StorageKey,
  store::RecordStore,
};
use tracing::{debug, info, warn};

use crate::{Pipeline, read_pdf, store_err};

/// What an indexing run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
  /// A new build was published.
  Built { build_id: String, chunks: usize },
  /// The document was already READY; the job was a redelivery.
  AlreadyReady,
}

impl<S: RecordStore> Pipeline<S> {
  #[tracing::instrument(
    skip(self, job),
    fields(user = %job.user, document_id = %job.document_id, key = %job.key)
  )]
  pub async fn index(&self, job: &IndexingJob) -> Result<IndexOutcome> {
    let document = self
      .store
      .get_document(&job.user, &job.document_id)
      .await
      .map_err(store_err)?
      .ok_or_else(|| Error::NotFound(format!("document {}", job.document_id)))?;

    if document.doc_status == DocStatus::Ready {
      debug!("document already indexed, skipping redelivered job");
      return Ok(IndexOutcome::AlreadyReady);
    }

    let key = StorageKey::parse(&job.key)
      .map_err(|_| Error::Malformed(format!("job key {:?}", job.key)))?;
    if key.user() != job.user {
      return Err(Error::Malformed(format!(
        "job for user {:?} names key {:?}",
        job.user, job.key
      )));
    }

    self
      .store
      .advance_status(&job.user, &job.document_id, DocStatus::Processing)
      .await
      .map_err(store_err)?;

    let body = self.services.blobs.get(&job.key).await?;
    let pages = read_pdf(&self.services.pdf, body, |pdf, bytes| pdf.page_texts(bytes)).await?;

    let chunks =
      Splitter::new(self.config.chunk_size, self.config.chunk_overlap).chunk_pages(&pages);
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = self.embed_all(&texts).await?;
    let index = FlatIndex::build(self.services.embedder.model_name(), chunks, vectors)?;

    let previous = read_manifest(self.services.blobs.as_ref(), &key).await?;
    let build_id = self.services.ids.next_id();
    let manifest = publish(self.services.blobs.as_ref(), &key, &build_id, &index).await?;
    prune_builds(self.services.blobs.as_ref(), &key, &manifest, previous.as_ref()).await;

    self
      .store
      .advance_status(&job.user, &job.document_id, DocStatus::Ready)
      .await
      .map_err(store_err)?;

    info!(%build_id, chunks = index.len(), pages = pages.len(), "index published");
    Ok(IndexOutcome::Built { build_id, chunks: index.len() })
  }

  /// Embed `texts` in batches of `embed_batch_size`, preserving order.
  async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(self.config.embed_batch_size.max(1)) {
      let embedded = self.services.embedder.embed(batch).await?;
      if embedded.len() != batch.len() {
        return Err(Error::unavailable(
          "embedding service",
          format!("returned {} vectors for {} texts", embedded.len(), batch.len()),
        ));
      }
      vectors.extend(embedded);
    }
    Ok(vectors)
  }
}

/// The currently published manifest for `key`, if any.
pub(crate) async fn read_manifest(
  blobs: &dyn BlobStore,
  key: &StorageKey,
) -> Result<Option<IndexManifest>> {
  match blobs.get(&key.manifest_key()).await {
    Ok(bytes) => Ok(IndexManifest::from_bytes(&bytes).ok()),
    Err(Error::NotFound(_)) => Ok(None),
    Err(e) => Err(e),
  }
}

/// Store both artifacts of a build, then the manifest naming it.
async fn publish(
  blobs: &dyn BlobStore,
  key: &StorageKey,
  build_id: &str,
  index: &FlatIndex,
) -> Result<IndexManifest> {
  let (vectors, metadata) = index.to_artifacts()?;
  let manifest = IndexManifest {
    build_id:     build_id.to_owned(),
    vectors_key:  key.vectors_key(build_id),
    metadata_key: key.metadata_key(build_id),
    model:        index.model().to_owned(),
    chunk_count:  index.len(),
    created:      Utc::now(),
  };

  blobs.put(&manifest.vectors_key, vectors).await?;
  blobs.put(&manifest.metadata_key, metadata).await?;
  blobs.put(&key.manifest_key(), manifest.to_bytes()?).await?;
  Ok(manifest)
}

/// Delete builds other than the one just published and the one it replaced.
/// The replaced build is kept for readers that resolved the old manifest.
async fn prune_builds(
  blobs: &dyn BlobStore,
  key: &StorageKey,
  current: &IndexManifest,
  previous: Option<&IndexManifest>,
) {
  let keys = match blobs.list(&key.derived_prefix()).await {
    Ok(keys) => keys,
    Err(e) => {
      warn!(error = %e, "could not list old index builds");
      return;
    }
  };

  for stale in keys {
    let Some(build) = key.build_of(&stale) else { continue };
    if build == current.build_id || previous.is_some_and(|p| p.build_id == build) {
      continue;
    }
    if let Err(e) = blobs.delete(&stale).await {
      warn!(key = %stale, error = %e, "could not delete stale index artifact");
    }
  }
}
