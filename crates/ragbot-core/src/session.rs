//! Chat sessions: the persisted message history of one conversation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload of a single history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
  pub content:           String,
  #[serde(default)]
  pub example:           bool,
  #[serde(default)]
  pub additional_kwargs: Map<String, Value>,
}

impl MessageData {
  fn new(content: impl Into<String>) -> Self {
    Self {
      content:           content.into(),
      example:           false,
      additional_kwargs: Map::new(),
    }
  }
}

/// One entry of a conversation history.
///
/// Serialises as `{"type": "human" | "ai", "data": {...}}`, the shape clients
/// already read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ChatMessage {
  /// A question asked by the user.
  Human(MessageData),
  /// An answer produced by the model.
  Ai(MessageData),
}

impl ChatMessage {
  pub fn human(content: impl Into<String>) -> Self {
    Self::Human(MessageData::new(content))
  }

  pub fn ai(content: impl Into<String>) -> Self {
    Self::Ai(MessageData::new(content))
  }

  pub fn content(&self) -> &str {
    match self {
      Self::Human(d) | Self::Ai(d) => &d.content,
    }
  }

  pub fn is_human(&self) -> bool { matches!(self, Self::Human(_)) }
}

/// The history record of one conversation, keyed by its conversation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
  #[serde(rename = "SessionId")]
  pub session_id: String,
  #[serde(rename = "History")]
  pub history:    Vec<ChatMessage>,
}

impl Session {
  /// A fresh session with no history.
  pub fn empty(session_id: impl Into<String>) -> Self {
    Self { session_id: session_id.into(), history: Vec::new() }
  }

  /// The last `turns` question/answer pairs (all of them when `None`).
  pub fn recent(&self, turns: Option<usize>) -> &[ChatMessage] {
    match turns {
      Some(n) => {
        let keep = n.saturating_mul(2).min(self.history.len());
        &self.history[self.history.len() - keep..]
      }
      None => &self.history,
    }
  }
}
