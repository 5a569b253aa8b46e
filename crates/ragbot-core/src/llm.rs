//! Chat-completion capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Result, session::ChatMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  System,
  User,
  Assistant,
}

/// One message of a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
  pub role:    Role,
  pub content: String,
}

impl PromptMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self { role: Role::System, content: content.into() }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into() }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self { role: Role::Assistant, content: content.into() }
  }
}

impl From<&ChatMessage> for PromptMessage {
  fn from(msg: &ChatMessage) -> Self {
    match msg {
      ChatMessage::Human(d) => Self::user(d.content.clone()),
      ChatMessage::Ai(d) => Self::assistant(d.content.clone()),
    }
  }
}

/// A hosted large language model.
#[async_trait]
pub trait CompletionModel: Send + Sync {
  /// Produce the assistant's reply to `messages`.
  async fn complete(&self, messages: &[PromptMessage]) -> Result<String>;
}
