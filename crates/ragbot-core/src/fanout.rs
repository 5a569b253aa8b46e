//! Live-connection fan-out capability.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::{Result, job::AnswerEvent};

/// A registered live connection and what it is listening to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
  pub connection_id: String,
  pub user_id:       String,
  /// Conversation ids this connection asked to receive answers for.
  pub subscriptions: HashSet<String>,
}

impl Connection {
  /// Whether an answer in `conversation_id` for `user_id` goes to this
  /// connection.
  pub fn wants(&self, user_id: &str, conversation_id: &str) -> bool {
    self.user_id == user_id && self.subscriptions.contains(conversation_id)
  }
}

/// Registry of live connections plus a per-connection push primitive.
#[async_trait]
pub trait Fanout: Send + Sync {
  /// Snapshot of every registered connection.
  async fn connections(&self) -> Result<Vec<Connection>>;

  /// Push one event to one connection. Fails with
  /// [`Error::Delivery`](crate::Error::Delivery) if that connection is gone.
  async fn push(&self, connection_id: &str, event: &AnswerEvent) -> Result<()>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wants_requires_owner_and_subscription() {
    let conn = Connection {
      connection_id: "ws-1".into(),
      user_id:       "alice".into(),
      subscriptions: HashSet::from(["c1".to_string()]),
    };
    assert!(conn.wants("alice", "c1"));
    assert!(!conn.wants("alice", "c2"));
    assert!(!conn.wants("bob", "c1"));
  }
}
