//! `PUT /upload/{fileName}`: store a PDF under the caller's prefix and
//! announce it to the ingestion listener.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use bytes::Bytes;
use ragbot_core::{Error, job::ObjectCreated, keys::StorageKey, store::RecordStore};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{AppState, error::ApiError, identity::Identity};

#[derive(Debug, Serialize, Deserialize)]
pub struct Accepted {
  pub key: String,
}

pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path(file_name): Path<String>,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + 'static,
{
  let key = StorageKey::new(&user, &file_name)?.to_string();
  let size = body.len() as u64;

  state.pipeline.services().blobs.put(&key, body).await?;
  state
    .uploads
    .send(ObjectCreated { key: key.clone(), size })
    .await
    .map_err(|_| Error::unavailable("upload notifications", "ingestion listener stopped"))?;

  info!(%key, size, "upload stored");
  Ok((StatusCode::ACCEPTED, Json(Accepted { key })))
}
