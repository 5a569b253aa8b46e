//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use ragbot_core::Error;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("missing caller identity")]
  Unauthorized,

  #[error(transparent)]
  Pipeline(#[from] Error),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::Pipeline(e) => match e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Malformed(_) | Error::InvalidKey(_) => StatusCode::BAD_REQUEST,
        Error::IndexNotReady(_) => StatusCode::CONFLICT,
        Error::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::Delivery { .. } | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(%status, error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
