//! Messages passed between stages: storage notifications, indexing jobs and
//! answer events.

use serde::{Deserialize, Serialize};

/// Notification that a new object landed in blob storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCreated {
  pub key:  String,
  pub size: u64,
}

/// The work-queue contract between ingestion and indexing: just enough to
/// re-locate the source object and the document record to update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingJob {
  pub document_id: String,
  pub key:         String,
  pub user:        String,
}

/// Payload pushed to live connections when an answer is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEvent {
  pub message:         String,
  pub conversation_id: String,
}
