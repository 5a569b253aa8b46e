//! `POST /ask`: answer a question about one of the caller's documents.
//!
//! Body: `{"fileName":"...","conversationId":"...","prompt":"..."}`. The
//! response is the answer text as a JSON string; the answer is also pushed
//! to the caller's live connections subscribed to the conversation.

use axum::{Json, extract::State};
use ragbot_core::store::RecordStore;
use ragbot_pipeline::Question;

use crate::{AppState, error::ApiError, identity::Identity};

pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Json(question): Json<Question>,
) -> Result<Json<String>, ApiError>
where
  S: RecordStore + 'static,
{
  let answer = state.pipeline.ask(&user, &question).await?;
  Ok(Json(answer.text))
}
