//! `GET /doc`: the caller's documents, newest first.

use axum::{Json, extract::State};
use ragbot_core::{document::Document, store::RecordStore};

use crate::{AppState, error::ApiError, identity::Identity};

pub async fn list<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
) -> Result<Json<Vec<Document>>, ApiError>
where
  S: RecordStore + 'static,
{
  Ok(Json(state.pipeline.list_documents(&user).await?))
}
