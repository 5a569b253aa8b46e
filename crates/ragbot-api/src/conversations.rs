//! Handlers for `/doc/{documentId}` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/doc/{documentId}` | New conversation; returns 201 `{conversationId}` |
//! | `GET`    | `/doc/{documentId}/{conversationId}` | Document plus the conversation's history |
//! | `DELETE` | `/doc/{documentId}/{conversationId}` | Body `{"fileName":"..."}`; removes the document and everything derived from it |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use ragbot_core::store::RecordStore;
use ragbot_pipeline::ConversationView;
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError, identity::Identity};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Created {
  pub conversation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
  pub document_id:     String,
  pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBody {
  pub file_name: String,
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /doc/{documentId}`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + 'static,
{
  let conversation_id = state.pipeline.create_conversation(&user, &document_id).await?;
  Ok((StatusCode::CREATED, Json(Created { conversation_id })))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /doc/{documentId}/{conversationId}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path((document_id, conversation_id)): Path<(String, String)>,
) -> Result<Json<ConversationView>, ApiError>
where
  S: RecordStore + 'static,
{
  let view = state
    .pipeline
    .get_conversation(&user, &document_id, &conversation_id)
    .await?;
  Ok(Json(view))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /doc/{documentId}/{conversationId}`
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path((document_id, conversation_id)): Path<(String, String)>,
  Json(body): Json<DeleteBody>,
) -> Result<Json<Deleted>, ApiError>
where
  S: RecordStore + 'static,
{
  state
    .pipeline
    .delete(&user, &document_id, &conversation_id, &body.file_name)
    .await?;
  Ok(Json(Deleted { document_id, conversation_id }))
}
