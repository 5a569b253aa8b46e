//! Error taxonomy shared by every stage and collaborator.

use thiserror::Error;

/// A boxed error from an external collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// A record or object that was asked for does not exist.
  #[error("not found: {0}")]
  NotFound(String),

  /// Input could not be parsed (e.g. an invalid PDF).
  #[error("malformed input: {0}")]
  Malformed(String),

  /// A storage key does not have the `{userId}/{fileName}` shape.
  #[error("invalid storage key: {0:?}")]
  InvalidKey(String),

  /// Storage, queue, embedding or completion call failed.
  #[error("{service} unavailable: {source}")]
  Unavailable {
    service: &'static str,
    #[source]
    source:  BoxError,
  },

  /// The vector index for a document is missing or only partially written.
  #[error("index not ready: {0}")]
  IndexNotReady(String),

  /// Pushing an answer to a single live connection failed.
  #[error("delivery to connection {connection_id} failed: {reason}")]
  Delivery {
    connection_id: String,
    reason:        String,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a collaborator failure, tagging it with the service name.
  pub fn unavailable(
    service: &'static str,
    source: impl Into<BoxError>,
  ) -> Self {
    Self::Unavailable { service, source: source.into() }
  }

  /// Whether retrying the same call later could succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Unavailable { .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
