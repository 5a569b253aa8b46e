//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 strings so that string order is time
//! order. Chat messages are stored as their wire JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use ragbot_core::{
  document::{ConversationSummary, DocStatus, Document},
  session::ChatMessage,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── DocStatus ───────────────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<DocStatus> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown document status: {s:?}")))
}

// ─── ChatMessage ─────────────────────────────────────────────────────────────

pub fn encode_message(m: &ChatMessage) -> Result<String> {
  Ok(serde_json::to_string(m)?)
}

pub fn decode_message(s: &str) -> Result<ChatMessage> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `conversations` row.
pub struct RawConversation {
  pub conversation_id: String,
  pub created:         String,
}

impl RawConversation {
  pub fn into_summary(self) -> Result<ConversationSummary> {
    Ok(ConversationSummary {
      conversation_id: self.conversation_id,
      created:         decode_dt(&self.created)?,
    })
  }
}

/// Raw values read from a `documents` row plus its conversations.
pub struct RawDocument {
  pub user_id:       String,
  pub document_id:   String,
  pub filename:      String,
  pub created:       String,
  pub pages:         i64,
  pub filesize:      i64,
  pub doc_status:    String,
  pub conversations: Vec<RawConversation>,
}

impl RawDocument {
  pub fn into_document(self) -> Result<Document> {
    let pages = u32::try_from(self.pages)
      .map_err(|_| Error::Decode(format!("page count {}", self.pages)))?;
    let filesize = u64::try_from(self.filesize)
      .map_err(|_| Error::Decode(format!("file size {}", self.filesize)))?;

    Ok(Document {
      user_id: self.user_id,
      document_id: self.document_id,
      filename: self.filename,
      created: decode_dt(&self.created)?,
      pages,
      filesize,
      doc_status: decode_status(&self.doc_status)?,
      conversations: self
        .conversations
        .into_iter()
        .map(RawConversation::into_summary)
        .collect::<Result<_>>()?,
    })
  }
}
