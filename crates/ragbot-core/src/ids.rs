//! Identifier generation.

use uuid::Uuid;

/// Source of collision-resistant identifiers for documents, conversations
/// and index builds.
pub trait IdGenerator: Send + Sync {
  fn next_id(&self) -> String;
}

/// Random 128-bit ids rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
  fn next_id(&self) -> String { Uuid::new_v4().simple().to_string() }
}
