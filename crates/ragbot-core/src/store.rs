//! The `RecordStore` trait: document metadata and chat-history storage.
//!
//! The trait is implemented by storage backends (e.g. `ragbot-store-sqlite`).
//! The pipeline and the API depend on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use crate::{
  document::{ConversationSummary, DocStatus, Document},
  session::{ChatMessage, Session},
};

/// Abstraction over the document and session tables.
///
/// Collection fields are only ever grown through the append methods, which
/// backends must implement atomically: two concurrent appends both survive.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Documents ─────────────────────────────────────────────────────────

  /// Insert or wholly replace a document, including its conversations.
  fn put_document<'a>(
    &'a self,
    document: &'a Document,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Retrieve a document by owner and id. Returns `None` if not found.
  fn get_document<'a>(
    &'a self,
    user_id: &'a str,
    document_id: &'a str,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + 'a;

  /// All documents owned by `user_id`, newest first.
  fn list_documents<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + 'a;

  /// Move a document's status forward to `status`.
  ///
  /// Returns `true` if the status changed. Writes that would not advance the
  /// status (including writes to a missing document) are ignored and return
  /// `false`.
  fn advance_status<'a>(
    &'a self,
    user_id: &'a str,
    document_id: &'a str,
    status: DocStatus,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Append a conversation summary to a document.
  ///
  /// Returns `false` if the document does not exist.
  fn append_conversation<'a>(
    &'a self,
    user_id: &'a str,
    document_id: &'a str,
    conversation: &'a ConversationSummary,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Delete a document and its conversation summaries. Deleting a missing
  /// document is not an error.
  fn delete_document<'a>(
    &'a self,
    user_id: &'a str,
    document_id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Sessions ──────────────────────────────────────────────────────────

  /// Insert or wholly replace a session.
  fn put_session<'a>(
    &'a self,
    session: &'a Session,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Retrieve a session by id. Returns `None` if not found.
  fn get_session<'a>(
    &'a self,
    session_id: &'a str,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + 'a;

  /// Append `messages`, in order, to the end of a session's history as one
  /// atomic write.
  ///
  /// Returns `false` if the session does not exist.
  fn append_messages<'a>(
    &'a self,
    session_id: &'a str,
    messages: &'a [ChatMessage],
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Delete a session and its history. Deleting a missing session is not an
  /// error.
  fn delete_session<'a>(
    &'a self,
    session_id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
