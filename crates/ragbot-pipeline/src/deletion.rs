//! Deletion: remove a document, its conversations and every stored object
//! derived from its upload.

use std::collections::BTreeSet;

use ragbot_core::{Result, keys::StorageKey, store::RecordStore};
use tracing::{debug, info};

use crate::{Pipeline, store_err};

impl<S: RecordStore> Pipeline<S> {
  /// Delete the document record, the session of every conversation on the
  /// document, the upload and all index artifacts. Missing records and
  /// objects are skipped. Sessions are only removed for conversations the
  /// stored document lists, so `conversation_id` cannot reach another
  /// document's history.
  #[tracing::instrument(skip(self))]
  pub async fn delete(
    &self,
    user_id: &str,
    document_id: &str,
    conversation_id: &str,
    file_name: &str,
  ) -> Result<()> {
    let key = StorageKey::new(user_id, file_name)?;

    let sessions: BTreeSet<String> = self
      .store
      .get_document(user_id, document_id)
      .await
      .map_err(store_err)?
      .map(|d| d.conversations.into_iter().map(|c| c.conversation_id).collect())
      .unwrap_or_default();
    if !sessions.contains(conversation_id) {
      debug!(%conversation_id, "conversation is not on this document, leaving its session");
    }

    self.store.delete_document(user_id, document_id).await.map_err(store_err)?;
    for session_id in &sessions {
      self.store.delete_session(session_id).await.map_err(store_err)?;
    }

    let blobs = &self.services.blobs;
    let derived = blobs.list(&key.derived_prefix()).await?;
    for object in &derived {
      blobs.delete(object).await?;
    }
    blobs.delete(&key.to_string()).await?;

    info!(sessions = sessions.len(), objects = derived.len() + 1, "document deleted");
    Ok(())
  }
}
