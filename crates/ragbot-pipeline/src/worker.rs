//! Background drivers for the asynchronous stages.
//!
//! - [`run_ingestion_listener`] drains upload notifications and ingests each
//!   PDF upload.
//! - [`run_indexing_worker`] receives indexing jobs from the work queue. A
//!   job that failed on an unavailable upstream is redelivered after an
//!   exponential backoff until `max_attempts` deliveries have failed. Any
//!   other failure, or the last allowed one, dead-letters the job (logged at
//!   `ERROR` and dropped).

use std::sync::Arc;

use ragbot_core::{
  Error,
  job::ObjectCreated,
  queue::{Delivery, JobQueue},
  store::RecordStore,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{IndexOutcome, Pipeline, ingest::is_upload_key};

// ─── Ingestion ───────────────────────────────────────────────────────────────

/// Ingest every PDF upload announced on `uploads` until the channel closes.
pub async fn run_ingestion_listener<S>(
  pipeline: Pipeline<S>,
  mut uploads: mpsc::Receiver<ObjectCreated>,
) where
  S: RecordStore,
{
  while let Some(event) = uploads.recv().await {
    if !is_upload_key(&event.key) {
      debug!(key = %event.key, "ignoring non-PDF object");
      continue;
    }
    if let Err(e) = pipeline.ingest(&event).await {
      error!(key = %event.key, error = %e, "ingestion failed");
    }
  }
  info!("upload channel closed, ingestion listener stopping");
}

// ─── Indexing ────────────────────────────────────────────────────────────────

/// Process indexing jobs until the queue is closed.
pub async fn run_indexing_worker<S>(pipeline: Pipeline<S>, worker: usize)
where
  S: RecordStore,
{
  let queue = Arc::clone(&pipeline.services().queue);
  loop {
    match queue.receive().await {
      Ok(Some(delivery)) => handle_delivery(&pipeline, delivery).await,
      Ok(None) => break,
      Err(e) => {
        warn!(worker, error = %e, "receiving from the work queue failed");
        tokio::time::sleep(pipeline.config().retry_delay(1)).await;
      }
    }
  }
  info!(worker, "work queue closed, indexing worker stopping");
}

/// Spawn `count` indexing workers on the current runtime.
pub fn spawn_indexing_workers<S>(pipeline: &Pipeline<S>, count: usize) -> Vec<JoinHandle<()>>
where
  S: RecordStore + 'static,
{
  (0..count.max(1))
    .map(|worker| tokio::spawn(run_indexing_worker(pipeline.clone(), worker)))
    .collect()
}

async fn handle_delivery<S: RecordStore>(pipeline: &Pipeline<S>, delivery: Delivery) {
  let attempt = delivery.attempt;
  let document_id = delivery.job.document_id.clone();

  match pipeline.index(&delivery.job).await {
    Ok(IndexOutcome::Built { .. } | IndexOutcome::AlreadyReady) => {}
    Err(Error::NotFound(what)) => {
      warn!(%document_id, %what, "dropping indexing job for a missing record");
    }
    Err(e) if e.is_retryable() && attempt < pipeline.config().max_attempts => {
      let delay = pipeline.config().retry_delay(attempt);
      warn!(%document_id, attempt, ?delay, error = %e, "indexing failed, will retry");
      let queue: Arc<dyn JobQueue> = Arc::clone(&pipeline.services().queue);
      tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = queue.retry(delivery).await {
          error!(%document_id, error = %e, "could not requeue indexing job");
        }
      });
    }
    Err(e) => {
      error!(
        %document_id,
        attempts = attempt,
        error = %e,
        "indexing job dead-lettered"
      );
    }
  }
}
