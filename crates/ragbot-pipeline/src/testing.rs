//! In-memory collaborators for tests.
//!
//! Enabled for this crate's own tests and, through the `test-util` feature,
//! for downstream crates. Each fake records what it was asked to do and can
//! be told to fail.

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  sync::{
    Arc, Mutex,
    atomic::{AtomicU64, AtomicUsize, Ordering},
  },
};

use async_trait::async_trait;
use bytes::Bytes;
use ragbot_core::{
  Error, Result,
  blob::BlobStore,
  document::{ConversationSummary, DocStatus, Document},
  embed::Embedder,
  fanout::{Connection, Fanout},
  ids::IdGenerator,
  job::{AnswerEvent, IndexingJob},
  llm::{CompletionModel, PromptMessage, Role},
  pdf::PdfReader,
  queue::{Delivery, JobQueue},
  session::{ChatMessage, Session},
  store::RecordStore,
};
use tokio::sync::mpsc;

use crate::Services;

fn injected(service: &'static str) -> Error {
  Error::unavailable(service, "injected failure")
}

// ─── Record store ────────────────────────────────────────────────────────────

/// A [`RecordStore`] over two hash maps.
#[derive(Default)]
pub struct MemoryStore {
  documents:           Mutex<HashMap<(String, String), Document>>,
  sessions:            Mutex<HashMap<String, Session>>,
  fail_document_puts:  Mutex<bool>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// Make every later `put_document` fail.
  pub fn fail_document_puts(&self) { *self.fail_document_puts.lock().unwrap() = true; }

  pub fn document_count(&self) -> usize { self.documents.lock().unwrap().len() }

  pub fn session_count(&self) -> usize { self.sessions.lock().unwrap().len() }
}

fn doc_key(user_id: &str, document_id: &str) -> (String, String) {
  (user_id.to_owned(), document_id.to_owned())
}

impl RecordStore for MemoryStore {
  type Error = Error;

  async fn put_document(&self, document: &Document) -> Result<()> {
    if *self.fail_document_puts.lock().unwrap() {
      return Err(injected("record store"));
    }
    self
      .documents
      .lock()
      .unwrap()
      .insert(doc_key(&document.user_id, &document.document_id), document.clone());
    Ok(())
  }

  async fn get_document(&self, user_id: &str, document_id: &str) -> Result<Option<Document>> {
    Ok(self.documents.lock().unwrap().get(&doc_key(user_id, document_id)).cloned())
  }

  async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>> {
    let mut docs: Vec<Document> = self
      .documents
      .lock()
      .unwrap()
      .values()
      .filter(|d| d.user_id == user_id)
      .cloned()
      .collect();
    docs.sort_by(|a, b| b.created.cmp(&a.created));
    Ok(docs)
  }

  async fn advance_status(
    &self,
    user_id: &str,
    document_id: &str,
    status: DocStatus,
  ) -> Result<bool> {
    let mut docs = self.documents.lock().unwrap();
    match docs.get_mut(&doc_key(user_id, document_id)) {
      Some(doc) if doc.doc_status.can_advance_to(status) => {
        doc.doc_status = status;
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn append_conversation(
    &self,
    user_id: &str,
    document_id: &str,
    conversation: &ConversationSummary,
  ) -> Result<bool> {
    let mut docs = self.documents.lock().unwrap();
    match docs.get_mut(&doc_key(user_id, document_id)) {
      Some(doc) => {
        doc.conversations.push(conversation.clone());
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn delete_document(&self, user_id: &str, document_id: &str) -> Result<()> {
    self.documents.lock().unwrap().remove(&doc_key(user_id, document_id));
    Ok(())
  }

  async fn put_session(&self, session: &Session) -> Result<()> {
    self
      .sessions
      .lock()
      .unwrap()
      .insert(session.session_id.clone(), session.clone());
    Ok(())
  }

  async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
    Ok(self.sessions.lock().unwrap().get(session_id).cloned())
  }

  async fn append_messages(&self, session_id: &str, messages: &[ChatMessage]) -> Result<bool> {
    let mut sessions = self.sessions.lock().unwrap();
    match sessions.get_mut(session_id) {
      Some(session) => {
        session.history.extend_from_slice(messages);
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn delete_session(&self, session_id: &str) -> Result<()> {
    self.sessions.lock().unwrap().remove(session_id);
    Ok(())
  }
}

// ─── Blob store ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryBlobs {
  objects:       Mutex<BTreeMap<String, Bytes>>,
  /// Puts whose key contains this string fail.
  fail_puts_for: Mutex<Option<String>>,
}

impl MemoryBlobs {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&self, key: &str, body: impl Into<Bytes>) {
    self.objects.lock().unwrap().insert(key.to_owned(), body.into());
  }

  pub fn keys(&self) -> Vec<String> { self.objects.lock().unwrap().keys().cloned().collect() }

  pub fn contains(&self, key: &str) -> bool { self.objects.lock().unwrap().contains_key(key) }

  pub fn fail_puts_containing(&self, pattern: &str) {
    *self.fail_puts_for.lock().unwrap() = Some(pattern.to_owned());
  }

  pub fn clear_failures(&self) { *self.fail_puts_for.lock().unwrap() = None; }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
  async fn put(&self, key: &str, body: Bytes) -> Result<()> {
    if let Some(pattern) = self.fail_puts_for.lock().unwrap().as_deref() {
      if key.contains(pattern) {
        return Err(injected("blob store"));
      }
    }
    self.insert(key, body);
    Ok(())
  }

  async fn get(&self, key: &str) -> Result<Bytes> {
    self
      .objects
      .lock()
      .unwrap()
      .get(key)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("object {key}")))
  }

  async fn list(&self, prefix: &str) -> Result<Vec<String>> {
    Ok(
      self
        .objects
        .lock()
        .unwrap()
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect(),
    )
  }

  async fn delete(&self, key: &str) -> Result<()> {
    self.objects.lock().unwrap().remove(key);
    Ok(())
  }
}

// ─── Work queue ──────────────────────────────────────────────────────────────

/// An unbounded in-process queue that remembers every job ever enqueued.
pub struct MemoryQueue {
  tx:       Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
  rx:       tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
  enqueued: Mutex<Vec<IndexingJob>>,
}

impl Default for MemoryQueue {
  fn default() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      tx:       Mutex::new(Some(tx)),
      rx:       tokio::sync::Mutex::new(rx),
      enqueued: Mutex::new(Vec::new()),
    }
  }
}

impl MemoryQueue {
  pub fn new() -> Self { Self::default() }

  /// Every job passed to `enqueue`, in order. Retries are not included.
  pub fn enqueued(&self) -> Vec<IndexingJob> { self.enqueued.lock().unwrap().clone() }

  /// Stop accepting jobs; receivers get `None` once the backlog drains.
  pub fn close(&self) { self.tx.lock().unwrap().take(); }

  fn send(&self, delivery: Delivery) -> Result<()> {
    let guard = self.tx.lock().unwrap();
    let tx = guard.as_ref().ok_or_else(|| injected("work queue"))?;
    tx.send(delivery).map_err(|e| Error::unavailable("work queue", e.to_string()))
  }
}

#[async_trait]
impl JobQueue for MemoryQueue {
  async fn enqueue(&self, job: &IndexingJob) -> Result<()> {
    self.send(Delivery { job: job.clone(), attempt: 1 })?;
    self.enqueued.lock().unwrap().push(job.clone());
    Ok(())
  }

  async fn receive(&self) -> Result<Option<Delivery>> {
    Ok(self.rx.lock().await.recv().await)
  }

  async fn retry(&self, delivery: Delivery) -> Result<()> {
    self.send(Delivery { attempt: delivery.attempt + 1, ..delivery })
  }
}

// ─── Fan-out ─────────────────────────────────────────────────────────────────

/// A connection registry that records pushes instead of sending them.
#[derive(Default)]
pub struct RecordingFanout {
  connections: Mutex<Vec<Connection>>,
  broken:      Mutex<HashSet<String>>,
  pushed:      Mutex<Vec<(String, AnswerEvent)>>,
}

impl RecordingFanout {
  pub fn new() -> Self { Self::default() }

  pub fn connect(&self, connection_id: &str, user_id: &str, subscriptions: &[&str]) {
    self.connections.lock().unwrap().push(Connection {
      connection_id: connection_id.to_owned(),
      user_id:       user_id.to_owned(),
      subscriptions: subscriptions.iter().map(|s| (*s).to_owned()).collect(),
    });
  }

  /// Pushes to `connection_id` fail from now on.
  pub fn break_connection(&self, connection_id: &str) {
    self.broken.lock().unwrap().insert(connection_id.to_owned());
  }

  /// `(connection_id, event)` for every successful push.
  pub fn pushed(&self) -> Vec<(String, AnswerEvent)> { self.pushed.lock().unwrap().clone() }
}

#[async_trait]
impl Fanout for RecordingFanout {
  async fn connections(&self) -> Result<Vec<Connection>> {
    Ok(self.connections.lock().unwrap().clone())
  }

  async fn push(&self, connection_id: &str, event: &AnswerEvent) -> Result<()> {
    if self.broken.lock().unwrap().contains(connection_id) {
      return Err(Error::Delivery {
        connection_id: connection_id.to_owned(),
        reason:        "connection gone".into(),
      });
    }
    self
      .pushed
      .lock()
      .unwrap()
      .push((connection_id.to_owned(), event.clone()));
    Ok(())
  }
}

// ─── PDF ─────────────────────────────────────────────────────────────────────

/// Reads a plain-text stand-in for PDF: a `%PDF-stub` header line followed
/// by pages separated by form feeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubPdf;

impl StubPdf {
  const HEADER: &'static str = "%PDF-stub\n";

  /// Encode `pages` in the format [`StubPdf`] reads.
  pub fn encode(pages: &[&str]) -> Bytes {
    Bytes::from(format!("{}{}", Self::HEADER, pages.join("\x0c")))
  }
}

impl PdfReader for StubPdf {
  fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>> {
    let text = std::str::from_utf8(bytes)
      .ok()
      .and_then(|t| t.strip_prefix(Self::HEADER))
      .ok_or_else(|| Error::Malformed("not a PDF".into()))?;
    Ok(text.split('\x0c').map(str::to_owned).collect())
  }
}

// ─── Embeddings ──────────────────────────────────────────────────────────────

/// Deterministic bag-of-words embeddings: each lowercase word adds one to a
/// hashed bucket. Texts sharing words score close under cosine.
#[derive(Default)]
pub struct KeywordEmbedder {
  failures_left: AtomicUsize,
  calls:         AtomicUsize,
}

impl KeywordEmbedder {
  pub const DIMS: usize = 64;

  pub fn new() -> Self { Self::default() }

  /// The next `n` calls fail as unavailable.
  pub fn fail_next(&self, n: usize) { self.failures_left.store(n, Ordering::SeqCst); }

  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

  pub fn vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; Self::DIMS];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
      let hash = word
        .to_lowercase()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3));
      v[(hash % Self::DIMS as u64) as usize] += 1.0;
    }
    v
  }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
  fn model_name(&self) -> &str { "keyword-test" }

  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let failing = self
      .failures_left
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if failing {
      return Err(injected("embedding service"));
    }
    Ok(texts.iter().map(|t| Self::vector(t)).collect())
  }
}

// ─── Completion model ────────────────────────────────────────────────────────

/// Replies with queued answers, or `answer to: {last user message}` when the
/// queue is empty. Every request is recorded.
#[derive(Default)]
pub struct ScriptedModel {
  replies:  Mutex<Vec<String>>,
  requests: Mutex<Vec<Vec<PromptMessage>>>,
}

impl ScriptedModel {
  pub fn new() -> Self { Self::default() }

  /// Queue replies, returned first-in first-out.
  pub fn reply_with(&self, replies: &[&str]) {
    let mut queued = self.replies.lock().unwrap();
    queued.extend(replies.iter().map(|r| (*r).to_owned()));
  }

  pub fn requests(&self) -> Vec<Vec<PromptMessage>> { self.requests.lock().unwrap().clone() }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
  async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
    self.requests.lock().unwrap().push(messages.to_vec());
    let mut replies = self.replies.lock().unwrap();
    if !replies.is_empty() {
      return Ok(replies.remove(0));
    }
    let last = messages
      .iter()
      .rev()
      .find(|m| m.role == Role::User)
      .map_or("", |m| m.content.as_str());
    Ok(format!("answer to: {last}"))
  }
}

// ─── Ids ─────────────────────────────────────────────────────────────────────

/// `id-1`, `id-2`, …
#[derive(Default)]
pub struct SequentialIds(AtomicU64);

impl IdGenerator for SequentialIds {
  fn next_id(&self) -> String { format!("id-{}", self.0.fetch_add(1, Ordering::SeqCst) + 1) }
}

// ─── Kit ─────────────────────────────────────────────────────────────────────

/// Every fake, with typed handles for assertions.
#[derive(Clone)]
pub struct TestKit {
  pub blobs:    Arc<MemoryBlobs>,
  pub queue:    Arc<MemoryQueue>,
  pub fanout:   Arc<RecordingFanout>,
  pub embedder: Arc<KeywordEmbedder>,
  pub llm:      Arc<ScriptedModel>,
}

impl Default for TestKit {
  fn default() -> Self {
    Self {
      blobs:    Arc::new(MemoryBlobs::new()),
      queue:    Arc::new(MemoryQueue::new()),
      fanout:   Arc::new(RecordingFanout::new()),
      embedder: Arc::new(KeywordEmbedder::new()),
      llm:      Arc::new(ScriptedModel::new()),
    }
  }
}

impl TestKit {
  pub fn new() -> Self { Self::default() }

  /// A [`Services`] set backed by this kit, with [`StubPdf`] and
  /// [`SequentialIds`].
  pub fn services(&self) -> Services {
    Services {
      blobs:    self.blobs.clone(),
      queue:    self.queue.clone(),
      fanout:   self.fanout.clone(),
      pdf:      Arc::new(StubPdf),
      embedder: self.embedder.clone(),
      llm:      self.llm.clone(),
      ids:      Arc::new(SequentialIds::default()),
    }
  }
}
