//! Document records and their embedded conversation summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Processing state of an uploaded document.
///
/// The declaration order is the lifecycle order; a document only ever moves
/// forward (see [`DocStatus::can_advance_to`]).
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DocStatus {
  /// Stored and registered; indexing has not started.
  Uploaded,
  /// An indexing job is running (or died mid-run).
  Processing,
  /// Both index artifacts are published.
  Ready,
}

impl DocStatus {
  /// `true` if moving from `self` to `next` goes strictly forward.
  pub fn can_advance_to(self, next: DocStatus) -> bool { next > self }

  /// Position in the lifecycle; stored alongside the name so the SQL
  /// backend can compare statuses.
  pub fn rank(self) -> i64 {
    match self {
      Self::Uploaded => 0,
      Self::Processing => 1,
      Self::Ready => 2,
    }
  }
}

// ─── Conversation summary ────────────────────────────────────────────────────

/// A conversation thread attached to a document. The message history lives
/// in the session record with the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
  pub conversation_id: String,
  pub created:         DateTime<Utc>,
}

// ─── Document ────────────────────────────────────────────────────────────────

/// Metadata for one uploaded PDF, keyed by `(user_id, document_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
  pub user_id:       String,
  pub document_id:   String,
  pub filename:      String,
  pub created:       DateTime<Utc>,
  pub pages:         u32,
  /// Size of the uploaded object in bytes.
  pub filesize:      u64,
  pub doc_status:    DocStatus,
  pub conversations: Vec<ConversationSummary>,
}

impl Document {
  /// Sort `conversations` most recent first, for presentation.
  pub fn sort_conversations_newest_first(&mut self) {
    self
      .conversations
      .sort_by(|a, b| b.created.cmp(&a.created));
  }

  /// Whether `conversation_id` belongs to this document.
  pub fn has_conversation(&self, conversation_id: &str) -> bool {
    self
      .conversations
      .iter()
      .any(|c| c.conversation_id == conversation_id)
  }
}
