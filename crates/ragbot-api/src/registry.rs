//! Registry of live WebSocket connections.
//!
//! Each connection owns an unbounded channel drained by its socket's send
//! task. The registry is the [`Fanout`] the answer stage pushes through.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use ragbot_core::{
  Error, Result,
  fanout::{Connection, Fanout},
  job::AnswerEvent,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// A frame sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
  Answer(AnswerEvent),
  Error { error: String },
}

struct ConnectionState {
  user_id:       String,
  subscriptions: HashSet<String>,
  tx:            mpsc::UnboundedSender<ServerMessage>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
  connections: DashMap<String, ConnectionState>,
}

impl ConnectionRegistry {
  pub fn new() -> Self { Self::default() }

  /// Register a connection for `user_id`. Returns its id and the receiving
  /// end of its outbound channel.
  pub fn register(&self, user_id: &str) -> (String, mpsc::UnboundedReceiver<ServerMessage>) {
    let connection_id = Uuid::new_v4().simple().to_string();
    let (tx, rx) = mpsc::unbounded_channel();
    debug!(%connection_id, user = user_id, "adding connection");
    self.connections.insert(
      connection_id.clone(),
      ConnectionState { user_id: user_id.to_owned(), subscriptions: HashSet::new(), tx },
    );
    (connection_id, rx)
  }

  pub fn remove(&self, connection_id: &str) {
    debug!(%connection_id, "removing connection");
    self.connections.remove(connection_id);
  }

  /// Returns `false` if the connection is not registered.
  pub fn subscribe(&self, connection_id: &str, conversation_id: &str) -> bool {
    match self.connections.get_mut(connection_id) {
      Some(mut conn) => {
        conn.subscriptions.insert(conversation_id.to_owned());
        true
      }
      None => false,
    }
  }

  pub fn unsubscribe(&self, connection_id: &str, conversation_id: &str) -> bool {
    match self.connections.get_mut(connection_id) {
      Some(mut conn) => {
        conn.subscriptions.remove(conversation_id);
        true
      }
      None => false,
    }
  }

  /// Queue a frame for one connection.
  pub fn send(&self, connection_id: &str, message: ServerMessage) -> Result<()> {
    let delivery_err = |reason: &str| Error::Delivery {
      connection_id: connection_id.to_owned(),
      reason:        reason.to_owned(),
    };
    let conn = self
      .connections
      .get(connection_id)
      .ok_or_else(|| delivery_err("not registered"))?;
    conn.tx.send(message).map_err(|_| delivery_err("connection closed"))
  }

  pub fn len(&self) -> usize { self.connections.len() }

  pub fn is_empty(&self) -> bool { self.connections.is_empty() }
}

#[async_trait]
impl Fanout for ConnectionRegistry {
  async fn connections(&self) -> Result<Vec<Connection>> {
    Ok(
      self
        .connections
        .iter()
        .map(|entry| Connection {
          connection_id: entry.key().clone(),
          user_id:       entry.user_id.clone(),
          subscriptions: entry.subscriptions.clone(),
        })
        .collect(),
    )
  }

  async fn push(&self, connection_id: &str, event: &AnswerEvent) -> Result<()> {
    self.send(connection_id, ServerMessage::Answer(event.clone()))
  }
}
