//! Caller identity, taken from a header set by the authenticating proxy in
//! front of the service.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, HeaderName, request::Parts},
};
use ragbot_core::store::RecordStore;

use crate::{AppState, error::ApiError};

/// The authenticated user id. Extracting it rejects with 401 when the
/// identity header is missing or blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

pub fn identity_from_headers(headers: &HeaderMap, header: &HeaderName) -> Result<String, ApiError> {
  let user = headers
    .get(header)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .ok_or(ApiError::Unauthorized)?;
  Ok(user.to_owned())
}

impl<S> FromRequestParts<AppState<S>> for Identity
where
  S: RecordStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    identity_from_headers(&parts.headers, &state.identity_header).map(Identity)
  }
}
