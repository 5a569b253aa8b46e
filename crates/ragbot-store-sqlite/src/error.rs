//! Error type for `ragbot-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column held a value the domain types do not recognise.
  #[error("invalid stored value: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
