//! Blob storage capability.

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

/// A hierarchical object store addressed by `/`-separated keys.
///
/// `put` must be atomic per object: a reader sees either the previous body or
/// the new one, never a torn write.
#[async_trait]
pub trait BlobStore: Send + Sync {
  async fn put(&self, key: &str, body: Bytes) -> Result<()>;

  /// Download an object. Fails with [`Error::NotFound`](crate::Error::NotFound)
  /// if it does not exist.
  async fn get(&self, key: &str) -> Result<Bytes>;

  /// Keys of every object whose key starts with `prefix`, sorted.
  async fn list(&self, prefix: &str) -> Result<Vec<String>>;

  /// Delete an object. Deleting a missing object is not an error.
  async fn delete(&self, key: &str) -> Result<()>;
}
