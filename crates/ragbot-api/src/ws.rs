//! `GET /ws`: live answer delivery.
//!
//! Client frames are JSON objects tagged by `action`:
//!
//! | Action | Fields | Effect |
//! |--------|--------|--------|
//! | `subscribe` | `conversationId` | Receive answers for the conversation |
//! | `unsubscribe` | `conversationId` | Stop receiving them |
//! | `GenerateResponse` | `fileName`, `prompt`, `conversationId` | Subscribe, then ask; the answer arrives as a push |
//!
//! The server sends `{message, conversationId}` for answers and `{error}`
//! when an action fails.

use axum::{
  extract::{
    State, WebSocketUpgrade,
    ws::{Message, WebSocket},
  },
  response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use ragbot_core::store::RecordStore;
use ragbot_pipeline::Question;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::{AppState, identity::Identity, registry::ServerMessage};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action")]
pub enum ClientAction {
  #[serde(rename = "subscribe", rename_all = "camelCase")]
  Subscribe { conversation_id: String },
  #[serde(rename = "unsubscribe", rename_all = "camelCase")]
  Unsubscribe { conversation_id: String },
  #[serde(rename = "GenerateResponse", rename_all = "camelCase")]
  GenerateResponse {
    file_name:       String,
    prompt:          String,
    conversation_id: String,
  },
}

pub async fn handler<S>(
  ws: WebSocketUpgrade,
  State(state): State<AppState<S>>,
  Identity(user): Identity,
) -> impl IntoResponse
where
  S: RecordStore + 'static,
{
  ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket<S>(socket: WebSocket, state: AppState<S>, user_id: String)
where
  S: RecordStore + 'static,
{
  let (connection_id, mut msg_rx) = state.registry.register(&user_id);
  info!(%connection_id, user = %user_id, "websocket connected");

  let (mut ws_tx, mut ws_rx) = socket.split();

  let send_task = tokio::spawn(async move {
    while let Some(msg) = msg_rx.recv().await {
      match serde_json::to_string(&msg) {
        Ok(json) => {
          if ws_tx.send(Message::Text(json.into())).await.is_err() {
            break;
          }
        }
        Err(e) => error!(error = %e, "failed to serialize websocket frame"),
      }
    }
  });

  while let Some(frame) = ws_rx.next().await {
    match frame {
      Ok(Message::Text(text)) => handle_action(&state, &connection_id, &user_id, text.as_str()),
      Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
        Ok(text) => handle_action(&state, &connection_id, &user_id, text),
        Err(_) => reply_error(&state, &connection_id, "binary frames must be UTF-8 JSON"),
      },
      Ok(Message::Close(_)) => break,
      Ok(Message::Ping(_) | Message::Pong(_)) => {}
      Err(e) => {
        debug!(%connection_id, error = %e, "websocket receive failed");
        break;
      }
    }
  }

  state.registry.remove(&connection_id);
  send_task.abort();
  info!(%connection_id, "websocket disconnected");
}

/// Apply one client frame. Answer generation runs on its own task so the
/// socket keeps reading while the model works.
pub(crate) fn handle_action<S>(state: &AppState<S>, connection_id: &str, user_id: &str, text: &str)
where
  S: RecordStore + 'static,
{
  let action = match serde_json::from_str::<ClientAction>(text) {
    Ok(action) => action,
    Err(e) => {
      reply_error(state, connection_id, &format!("invalid action: {e}"));
      return;
    }
  };

  match action {
    ClientAction::Subscribe { conversation_id } => {
      state.registry.subscribe(connection_id, &conversation_id);
    }
    ClientAction::Unsubscribe { conversation_id } => {
      state.registry.unsubscribe(connection_id, &conversation_id);
    }
    ClientAction::GenerateResponse { file_name, prompt, conversation_id } => {
      state.registry.subscribe(connection_id, &conversation_id);
      let question = Question { file_name, conversation_id, prompt };
      let state = state.clone();
      let connection_id = connection_id.to_owned();
      let user_id = user_id.to_owned();
      tokio::spawn(async move {
        if let Err(e) = state.pipeline.ask(&user_id, &question).await {
          warn!(%connection_id, error = %e, "websocket question failed");
          reply_error(&state, &connection_id, &e.to_string());
        }
      });
    }
  }
}

fn reply_error<S>(state: &AppState<S>, connection_id: &str, error: &str) {
  let message = ServerMessage::Error { error: error.to_owned() };
  if let Err(e) = state.registry.send(connection_id, message) {
    debug!(error = %e, "could not report action error");
  }
}
