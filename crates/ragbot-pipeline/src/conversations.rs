//! Conversation management: new threads on a document, and the reads the UI
//! needs to render them.

use chrono::Utc;
use ragbot_core::{
  Error, Result,
  document::{ConversationSummary, Document},
  session::{ChatMessage, Session},
  store::RecordStore,
};
use serde::Serialize;
use tracing::info;

use crate::{Pipeline, store_err};

/// A document together with one of its conversations' history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
  pub conversation_id: String,
  /// Conversations sorted newest first.
  pub document:        Document,
  pub messages:        Vec<ChatMessage>,
}

impl<S: RecordStore> Pipeline<S> {
  /// Start a new conversation on an existing document and return its id.
  #[tracing::instrument(skip(self))]
  pub async fn create_conversation(&self, user_id: &str, document_id: &str) -> Result<String> {
    let not_found = || Error::NotFound(format!("document {document_id}"));

    self
      .store
      .get_document(user_id, document_id)
      .await
      .map_err(store_err)?
      .ok_or_else(not_found)?;

    let conversation_id = self.services.ids.next_id();
    self
      .store
      .put_session(&Session::empty(conversation_id.clone()))
      .await
      .map_err(store_err)?;

    let summary = ConversationSummary {
      conversation_id: conversation_id.clone(),
      created:         Utc::now(),
    };
    let appended = self
      .store
      .append_conversation(user_id, document_id, &summary)
      .await
      .map_err(store_err)?;
    if !appended {
      // Deleted between the read and the append.
      self.store.delete_session(&conversation_id).await.map_err(store_err)?;
      return Err(not_found());
    }

    info!(%conversation_id, "conversation created");
    Ok(conversation_id)
  }

  /// Load a document and the full history of one conversation.
  #[tracing::instrument(skip(self))]
  pub async fn get_conversation(
    &self,
    user_id: &str,
    document_id: &str,
    conversation_id: &str,
  ) -> Result<ConversationView> {
    let mut document = self
      .store
      .get_document(user_id, document_id)
      .await
      .map_err(store_err)?
      .ok_or_else(|| Error::NotFound(format!("document {document_id}")))?;
    let not_found = || Error::NotFound(format!("conversation {conversation_id}"));
    if !document.has_conversation(conversation_id) {
      return Err(not_found());
    }
    document.sort_conversations_newest_first();

    let session = self
      .store
      .get_session(conversation_id)
      .await
      .map_err(store_err)?
      .ok_or_else(not_found)?;

    Ok(ConversationView {
      conversation_id: conversation_id.to_owned(),
      document,
      messages: session.history,
    })
  }

  /// Every document owned by `user_id`, newest first.
  pub async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>> {
    self.store.list_documents(user_id).await.map_err(store_err)
  }
}
