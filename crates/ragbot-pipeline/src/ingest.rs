//! Document ingestion: turn a stored upload into a document record, an empty
//! conversation and a queued indexing job.

use chrono::Utc;
use ragbot_core::{
  Error, Result,
  document::{ConversationSummary, DocStatus, Document},
  job::{IndexingJob, ObjectCreated},
  keys::StorageKey,
  session::Session,
  store::RecordStore,
};
use tracing::{info, warn};

use crate::{Pipeline, read_pdf, store_err};

/// Whether an object key names an upload that should be ingested: a
/// `{userId}/{fileName}` key whose file name ends in `.pdf`.
pub fn is_upload_key(key: &str) -> bool {
  StorageKey::parse(key).is_ok_and(|k| k.file_name().to_ascii_lowercase().ends_with(".pdf"))
}

impl<S: RecordStore> Pipeline<S> {
  /// Register a freshly uploaded PDF.
  ///
  /// Writes the session before the document and removes it again if the
  /// document write fails, so either both records exist or neither does.
  /// The indexing job is enqueued only once both exist.
  #[tracing::instrument(skip(self, event), fields(key = %event.key))]
  pub async fn ingest(&self, event: &ObjectCreated) -> Result<Document> {
    let key = StorageKey::parse(&event.key)
      .map_err(|_| Error::Malformed(format!("upload key {:?}", event.key)))?;

    let body = self.services.blobs.get(&event.key).await?;
    let pages = read_pdf(&self.services.pdf, body, |pdf, bytes| pdf.page_count(bytes)).await?;

    let document_id = self.services.ids.next_id();
    let conversation_id = self.services.ids.next_id();
    let now = Utc::now();

    let document = Document {
      user_id: key.user().to_owned(),
      document_id: document_id.clone(),
      filename: key.file_name().to_owned(),
      created: now,
      pages,
      filesize: event.size,
      doc_status: DocStatus::Uploaded,
      conversations: vec![ConversationSummary {
        conversation_id: conversation_id.clone(),
        created:         now,
      }],
    };

    self
      .store
      .put_session(&Session::empty(conversation_id.clone()))
      .await
      .map_err(store_err)?;

    if let Err(e) = self.store.put_document(&document).await {
      if let Err(undo) = self.store.delete_session(&conversation_id).await {
        warn!(%conversation_id, error = %undo, "could not remove orphaned session");
      }
      return Err(store_err(e));
    }

    let job = IndexingJob {
      document_id: document_id.clone(),
      key:         event.key.clone(),
      user:        key.user().to_owned(),
    };
    self.services.queue.enqueue(&job).await?;

    info!(
      user = %key.user(),
      %document_id,
      %conversation_id,
      pages,
      "document registered and queued for indexing"
    );
    Ok(document)
  }
}
