//! Work-queue capability.

use async_trait::async_trait;

use crate::{Result, job::IndexingJob};

/// A received job together with its delivery count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
  pub job:     IndexingJob,
  /// 1 on first delivery, incremented on each retry.
  pub attempt: u32,
}

/// At-least-once delivery of [`IndexingJob`]s.
///
/// Consumers must treat every job as possibly redelivered.
#[async_trait]
pub trait JobQueue: Send + Sync {
  async fn enqueue(&self, job: &IndexingJob) -> Result<()>;

  /// Wait for the next job. Returns `None` once the queue is closed.
  async fn receive(&self) -> Result<Option<Delivery>>;

  /// Put a failed delivery back on the queue for another attempt.
  async fn retry(&self, delivery: Delivery) -> Result<()>;
}
