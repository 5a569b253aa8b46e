//! In-process work queue.
//!
//! Jobs travel as JSON text, the same body an external broker would carry,
//! so a message that cannot be decoded is dropped with a warning instead of
//! wedging the consumer. The channel is bounded: `enqueue` waits while the
//! backlog is full.

use async_trait::async_trait;
use ragbot_core::{
  Error, Result,
  job::IndexingJob,
  queue::{Delivery, JobQueue},
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::warn;

#[derive(Serialize, Deserialize)]
struct Envelope {
  job:     IndexingJob,
  attempt: u32,
}

pub struct ChannelQueue {
  tx: Mutex<Option<mpsc::Sender<String>>>,
  rx: Mutex<mpsc::Receiver<String>>,
}

impl ChannelQueue {
  /// A queue holding at most `capacity` pending messages.
  pub fn new(capacity: usize) -> Self {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    Self { tx: Mutex::new(Some(tx)), rx: Mutex::new(rx) }
  }

  /// Stop accepting jobs. Consumers drain the backlog, then see `None`.
  pub async fn close(&self) { self.tx.lock().await.take(); }

  /// Messages waiting to be received.
  pub async fn depth(&self) -> usize {
    match self.tx.lock().await.as_ref() {
      Some(tx) => tx.max_capacity() - tx.capacity(),
      None => 0,
    }
  }

  async fn send(&self, envelope: &Envelope) -> Result<()> {
    let body = serde_json::to_string(envelope)?;
    // Clone the sender so a full channel does not hold the lock.
    let tx = self
      .tx
      .lock()
      .await
      .clone()
      .ok_or_else(|| Error::unavailable("work queue", "queue is closed"))?;
    tx.send(body)
      .await
      .map_err(|_| Error::unavailable("work queue", "queue is closed"))
  }
}

#[async_trait]
impl JobQueue for ChannelQueue {
  async fn enqueue(&self, job: &IndexingJob) -> Result<()> {
    self.send(&Envelope { job: job.clone(), attempt: 1 }).await
  }

  async fn receive(&self) -> Result<Option<Delivery>> {
    let mut rx = self.rx.lock().await;
    while let Some(body) = rx.recv().await {
      match serde_json::from_str::<Envelope>(&body) {
        Ok(Envelope { job, attempt }) => return Ok(Some(Delivery { job, attempt })),
        Err(e) => warn!(error = %e, %body, "discarding undecodable queue message"),
      }
    }
    Ok(None)
  }

  async fn retry(&self, delivery: Delivery) -> Result<()> {
    self
      .send(&Envelope { job: delivery.job, attempt: delivery.attempt + 1 })
      .await
  }
}
