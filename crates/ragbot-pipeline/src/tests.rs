//! Stage tests against the in-memory collaborators.

use std::{sync::Arc, time::Duration};

use ragbot_core::{
  Error,
  blob::BlobStore as _,
  chunk::Splitter,
  document::{DocStatus, Document},
  index::FlatIndex,
  job::ObjectCreated,
  session::ChatMessage,
  store::RecordStore,
};
use ragbot_store_sqlite::SqliteStore;
use tokio::sync::mpsc;

use crate::{
  IndexOutcome, Pipeline, PipelineConfig, Question,
  testing::{MemoryStore, StubPdf, TestKit},
  worker,
};

const REPORT: [&str; 5] = [
  "Executive summary. The project shipped on time.",
  "Quarterly revenue grew by ten percent in the third quarter.",
  "Hiring plans for next year focus on engineering.",
  "Risks include supply chain delays.",
  "Appendix with glossary terms.",
];

fn setup() -> (Pipeline<MemoryStore>, TestKit) {
  setup_with(PipelineConfig::default())
}

fn setup_with(config: PipelineConfig) -> (Pipeline<MemoryStore>, TestKit) {
  let kit = TestKit::new();
  let pipeline = Pipeline::new(Arc::new(MemoryStore::new()), kit.services(), config);
  (pipeline, kit)
}

fn upload_event(kit: &TestKit, key: &str, pages: &[&str]) -> ObjectCreated {
  kit.blobs.insert(key, StubPdf::encode(pages));
  ObjectCreated { key: key.to_owned(), size: 2048 }
}

/// Ingest and index `alice/report.pdf`, returning the document.
async fn ready_report<S: RecordStore>(pipeline: &Pipeline<S>, kit: &TestKit) -> Document {
  let doc = pipeline
    .ingest(&upload_event(kit, "alice/report.pdf", &REPORT))
    .await
    .unwrap();
  let job = kit.queue.enqueued().pop().unwrap();
  pipeline.index(&job).await.unwrap();
  doc
}

fn question(conversation_id: &str, prompt: &str) -> Question {
  Question {
    file_name:       "report.pdf".into(),
    conversation_id: conversation_id.into(),
    prompt:          prompt.into(),
  }
}

async fn status<S: RecordStore>(pipeline: &Pipeline<S>, doc: &Document) -> DocStatus {
  pipeline
    .store()
    .get_document(&doc.user_id, &doc.document_id)
    .await
    .unwrap()
    .unwrap()
    .doc_status
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_registers_document_session_and_job() {
  let (p, kit) = setup();
  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();

  assert_eq!(doc.user_id, "alice");
  assert_eq!(doc.filename, "report.pdf");
  assert_eq!(doc.pages, 5);
  assert_eq!(doc.filesize, 2048);
  assert_eq!(doc.doc_status, DocStatus::Uploaded);
  assert_eq!(doc.conversations.len(), 1);

  let conversation_id = &doc.conversations[0].conversation_id;
  let session = p.store().get_session(conversation_id).await.unwrap().unwrap();
  assert!(session.history.is_empty());

  let jobs = kit.queue.enqueued();
  assert_eq!(jobs.len(), 1);
  assert_eq!(jobs[0].document_id, doc.document_id);
  assert_eq!(jobs[0].key, "alice/report.pdf");
  assert_eq!(jobs[0].user, "alice");
}

#[tokio::test]
async fn invalid_pdf_writes_no_records_and_no_job() {
  let (p, kit) = setup();
  kit.blobs.insert("alice/broken.pdf", "definitely not a pdf");
  let event = ObjectCreated { key: "alice/broken.pdf".into(), size: 20 };

  let err = p.ingest(&event).await.unwrap_err();
  assert!(matches!(err, Error::Malformed(_)), "{err}");
  assert_eq!(p.store().document_count(), 0);
  assert_eq!(p.store().session_count(), 0);
  assert!(kit.queue.enqueued().is_empty());
}

#[tokio::test]
async fn key_without_user_is_malformed() {
  let (p, kit) = setup();
  let event = upload_event(&kit, "report.pdf", &REPORT);
  assert!(matches!(p.ingest(&event).await, Err(Error::Malformed(_))));
}

#[tokio::test]
async fn failed_document_write_removes_the_session() {
  let (p, kit) = setup();
  p.store().fail_document_puts();

  let err = p
    .ingest(&upload_event(&kit, "alice/report.pdf", &REPORT))
    .await
    .unwrap_err();
  assert!(err.is_retryable());
  assert_eq!(p.store().session_count(), 0);
  assert!(kit.queue.enqueued().is_empty());
}

// ─── Indexing ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn indexing_publishes_a_build_and_marks_ready() {
  let (p, kit) = setup();
  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();
  let job = kit.queue.enqueued().pop().unwrap();

  let outcome = p.index(&job).await.unwrap();
  let IndexOutcome::Built { build_id, chunks } = outcome else {
    panic!("expected a build, got {outcome:?}");
  };
  assert_eq!(chunks, 5);

  assert!(kit.blobs.contains("alice/report.pdf/index.manifest"));
  assert!(kit.blobs.contains(&format!("alice/report.pdf/index.{build_id}.vectors")));
  assert!(kit.blobs.contains(&format!("alice/report.pdf/index.{build_id}.json")));
  assert_eq!(status(&p, &doc).await, DocStatus::Ready);
}

#[tokio::test]
async fn redelivered_job_for_ready_document_does_no_work() {
  let (p, kit) = setup();
  ready_report(&p, &kit).await;
  let calls = kit.embedder.calls();
  let keys = kit.blobs.keys();

  let job = kit.queue.enqueued().pop().unwrap();
  assert_eq!(p.index(&job).await.unwrap(), IndexOutcome::AlreadyReady);
  assert_eq!(kit.embedder.calls(), calls);
  assert_eq!(kit.blobs.keys(), keys);
}

#[tokio::test]
async fn failed_embedding_leaves_processing_and_no_manifest() {
  let (p, kit) = setup();
  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();
  kit.embedder.fail_next(1);

  let job = kit.queue.enqueued().pop().unwrap();
  let err = p.index(&job).await.unwrap_err();
  assert!(err.is_retryable());
  assert_eq!(status(&p, &doc).await, DocStatus::Processing);
  assert!(!kit.blobs.contains("alice/report.pdf/index.manifest"));
}

#[tokio::test]
async fn failed_manifest_write_never_marks_ready() {
  let (p, kit) = setup();
  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();
  kit.blobs.fail_puts_containing("index.manifest");

  let job = kit.queue.enqueued().pop().unwrap();
  assert!(p.index(&job).await.is_err());
  assert_eq!(status(&p, &doc).await, DocStatus::Processing);

  kit.blobs.clear_failures();
  assert!(matches!(p.index(&job).await.unwrap(), IndexOutcome::Built { .. }));
  assert_eq!(status(&p, &doc).await, DocStatus::Ready);
}

#[tokio::test]
async fn rebuilding_keeps_only_current_and_previous_builds() {
  let (p, kit) = setup();
  let doc = ready_report(&p, &kit).await;
  let job = kit.queue.enqueued().pop().unwrap();

  let mut builds = Vec::new();
  for _ in 0..2 {
    // Reset the record so the job is not treated as a redelivery.
    p.store()
      .put_document(&Document { doc_status: DocStatus::Uploaded, ..doc.clone() })
      .await
      .unwrap();
    let IndexOutcome::Built { build_id, .. } = p.index(&job).await.unwrap() else {
      panic!("expected a build");
    };
    builds.push(build_id);
  }

  let artifact_builds: std::collections::BTreeSet<String> = kit
    .blobs
    .keys()
    .iter()
    .filter_map(|k| {
      k.strip_prefix("alice/report.pdf/index.")?
        .strip_suffix(".vectors")
        .map(str::to_owned)
    })
    .collect();
  assert_eq!(artifact_builds, builds.into_iter().collect());
}

#[tokio::test]
async fn indexing_a_missing_document_is_not_found() {
  let (p, _kit) = setup();
  let job = ragbot_core::job::IndexingJob {
    document_id: "ghost".into(),
    key:         "alice/ghost.pdf".into(),
    user:        "alice".into(),
  };
  assert!(matches!(p.index(&job).await, Err(Error::NotFound(_))));
}

// ─── Conversations ───────────────────────────────────────────────────────────

#[tokio::test]
async fn create_conversation_adds_summary_and_empty_session() {
  let (p, kit) = setup();
  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();

  let conversation_id = p.create_conversation("alice", &doc.document_id).await.unwrap();

  let stored = p.store().get_document("alice", &doc.document_id).await.unwrap().unwrap();
  assert_eq!(stored.conversations.len(), 2);
  assert!(stored.has_conversation(&conversation_id));
  let session = p.store().get_session(&conversation_id).await.unwrap().unwrap();
  assert!(session.history.is_empty());
}

#[tokio::test]
async fn create_conversation_on_missing_document_is_not_found() {
  let (p, _kit) = setup();
  assert!(matches!(
    p.create_conversation("alice", "ghost").await,
    Err(Error::NotFound(_))
  ));
  assert_eq!(p.store().session_count(), 0);
}

#[tokio::test]
async fn get_conversation_sorts_newest_first() {
  let (p, kit) = setup();
  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();
  let first = doc.conversations[0].conversation_id.clone();
  tokio::time::sleep(Duration::from_millis(5)).await;
  let second = p.create_conversation("alice", &doc.document_id).await.unwrap();

  let view = p.get_conversation("alice", &doc.document_id, &first).await.unwrap();
  let order: Vec<_> = view
    .document
    .conversations
    .iter()
    .map(|c| c.conversation_id.clone())
    .collect();
  assert_eq!(order, [second, first.clone()]);
  assert_eq!(view.conversation_id, first);
  assert!(view.messages.is_empty());
}

#[tokio::test]
async fn get_conversation_of_another_user_is_not_found() {
  let (p, kit) = setup();
  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();
  let conv = &doc.conversations[0].conversation_id;
  assert!(matches!(
    p.get_conversation("bob", &doc.document_id, conv).await,
    Err(Error::NotFound(_))
  ));
}

#[tokio::test]
async fn get_conversation_through_own_document_needs_ownership() {
  let (p, kit) = setup();
  let alice_doc = ready_report(&p, &kit).await;
  let alice_conv = alice_doc.conversations[0].conversation_id.clone();
  p.ask("alice", &question(&alice_conv, "secret question")).await.unwrap();
  let bob_doc = p.ingest(&upload_event(&kit, "bob/mine.pdf", &REPORT)).await.unwrap();

  assert!(matches!(
    p.get_conversation("bob", &bob_doc.document_id, &alice_conv).await,
    Err(Error::NotFound(_))
  ));
  let view = p
    .get_conversation("alice", &alice_doc.document_id, &alice_conv)
    .await
    .unwrap();
  assert_eq!(view.messages.len(), 2);
}

// ─── Query/answer ────────────────────────────────────────────────────────────

#[tokio::test]
async fn ask_before_indexing_is_not_ready() {
  let (p, kit) = setup();
  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();
  let conv = &doc.conversations[0].conversation_id;

  let err = p.ask("alice", &question(conv, "Anything?")).await.unwrap_err();
  assert!(matches!(err, Error::IndexNotReady(_)), "{err}");
}

#[tokio::test]
async fn ask_with_missing_artifact_is_not_ready() {
  let (p, kit) = setup();
  let doc = ready_report(&p, &kit).await;
  let conv = &doc.conversations[0].conversation_id;
  let vectors = kit
    .blobs
    .keys()
    .into_iter()
    .find(|k| k.ends_with(".vectors"))
    .unwrap();
  ragbot_core::blob::BlobStore::delete(kit.blobs.as_ref(), &vectors).await.unwrap();

  let err = p.ask("alice", &question(conv, "Anything?")).await.unwrap_err();
  assert!(matches!(err, Error::IndexNotReady(_)), "{err}");
}

#[tokio::test]
async fn ask_on_unknown_conversation_is_not_found() {
  let (p, kit) = setup();
  ready_report(&p, &kit).await;
  assert!(matches!(
    p.ask("alice", &question("ghost", "Anything?")).await,
    Err(Error::NotFound(_))
  ));
}

#[tokio::test]
async fn ask_retrieves_the_relevant_page() {
  let config = PipelineConfig { top_k: 1, ..Default::default() };
  let (p, kit) = setup_with(config);
  let doc = ready_report(&p, &kit).await;
  let conv = &doc.conversations[0].conversation_id;

  let answer = p
    .ask("alice", &question(conv, "Quarterly revenue grew by what percent in the quarter?"))
    .await
    .unwrap();

  assert_eq!(answer.sources.len(), 1);
  assert_eq!(answer.sources[0].page, 2);
  let request = kit.llm.requests().pop().unwrap();
  assert!(request[0].content.contains("Quarterly revenue grew"));
}

#[tokio::test]
async fn questions_append_alternating_history() {
  let (p, kit) = setup();
  let doc = ready_report(&p, &kit).await;
  let conv = doc.conversations[0].conversation_id.clone();

  kit.llm.reply_with(&["It shipped on time."]);
  p.ask("alice", &question(&conv, "Did it ship?")).await.unwrap();
  let after_one = p.store().get_session(&conv).await.unwrap().unwrap().history;

  kit.llm.reply_with(&["What grew in the third quarter?", "Revenue, by ten percent."]);
  let answer = p.ask("alice", &question(&conv, "What grew?")).await.unwrap();
  assert_eq!(answer.text, "Revenue, by ten percent.");

  let history = p.store().get_session(&conv).await.unwrap().unwrap().history;
  assert_eq!(history.len(), 4);
  assert_eq!(&history[..2], &after_one[..]);
  let contents: Vec<_> = history.iter().map(ChatMessage::content).collect();
  assert_eq!(contents, [
    "Did it ship?",
    "It shipped on time.",
    "What grew?",
    "Revenue, by ten percent.",
  ]);
  assert!(history[0].is_human() && !history[1].is_human());
  assert!(history[2].is_human() && !history[3].is_human());
}

#[tokio::test]
async fn follow_up_is_condensed_and_history_replayed() {
  let (p, kit) = setup();
  let doc = ready_report(&p, &kit).await;
  let conv = doc.conversations[0].conversation_id.clone();

  kit.llm.reply_with(&["first answer"]);
  p.ask("alice", &question(&conv, "first question")).await.unwrap();
  assert_eq!(kit.llm.requests().len(), 1);

  kit.llm.reply_with(&["standalone", "second answer"]);
  p.ask("alice", &question(&conv, "and then?")).await.unwrap();

  let requests = kit.llm.requests();
  assert_eq!(requests.len(), 3);
  let condense = &requests[1];
  assert!(condense[1].content.contains("Human: first question"));
  assert!(condense[1].content.contains("Follow Up Input: and then?"));

  let answer_request = &requests[2];
  let replayed: Vec<_> = answer_request[1..].iter().map(|m| m.content.as_str()).collect();
  assert_eq!(replayed, ["first question", "first answer", "and then?"]);
}

#[tokio::test]
async fn condensing_can_be_disabled() {
  let config = PipelineConfig { condense_question: false, ..Default::default() };
  let (p, kit) = setup_with(config);
  let doc = ready_report(&p, &kit).await;
  let conv = doc.conversations[0].conversation_id.clone();

  p.ask("alice", &question(&conv, "one")).await.unwrap();
  p.ask("alice", &question(&conv, "two")).await.unwrap();
  assert_eq!(kit.llm.requests().len(), 2);
}

#[tokio::test]
async fn history_turns_limits_replayed_history() {
  let config = PipelineConfig {
    history_turns: Some(1),
    condense_question: false,
    ..Default::default()
  };
  let (p, kit) = setup_with(config);
  let doc = ready_report(&p, &kit).await;
  let conv = doc.conversations[0].conversation_id.clone();

  for prompt in ["one", "two", "three"] {
    p.ask("alice", &question(&conv, prompt)).await.unwrap();
  }
  let last = kit.llm.requests().pop().unwrap();
  let replayed: Vec<_> = last[1..].iter().map(|m| m.content.as_str()).collect();
  assert_eq!(replayed, ["two", "answer to: two", "three"]);
}

#[tokio::test]
async fn answer_reaches_only_subscribed_connections_of_the_user() {
  let (p, kit) = setup();
  let doc = ready_report(&p, &kit).await;
  let conv = doc.conversations[0].conversation_id.clone();

  kit.fanout.connect("ws-1", "alice", &[&conv]);
  kit.fanout.connect("ws-2", "alice", &["other"]);
  kit.fanout.connect("ws-3", "bob", &[&conv]);
  kit.fanout.connect("ws-4", "alice", &[&conv]);
  kit.fanout.break_connection("ws-4");

  let answer = p.ask("alice", &question(&conv, "Did it ship?")).await.unwrap();
  assert_eq!(answer.delivered, 1);
  assert_eq!(answer.failed, 1);

  let pushed = kit.fanout.pushed();
  assert_eq!(pushed.len(), 1);
  assert_eq!(pushed[0].0, "ws-1");
  assert_eq!(pushed[0].1.message, answer.text);
  assert_eq!(pushed[0].1.conversation_id, conv);
}

#[tokio::test]
async fn ask_cannot_use_another_users_conversation() {
  let (p, kit) = setup();
  let alice_doc = ready_report(&p, &kit).await;
  let alice_conv = alice_doc.conversations[0].conversation_id.clone();
  p.ask("alice", &question(&alice_conv, "secret question")).await.unwrap();

  let bob_doc = p.ingest(&upload_event(&kit, "bob/report.pdf", &REPORT)).await.unwrap();
  let job = kit.queue.enqueued().pop().unwrap();
  assert_eq!(job.document_id, bob_doc.document_id);
  p.index(&job).await.unwrap();
  let requests = kit.llm.requests().len();

  assert!(matches!(
    p.ask("bob", &question(&alice_conv, "what did alice ask?")).await,
    Err(Error::NotFound(_))
  ));
  assert_eq!(kit.llm.requests().len(), requests);
  let history = p.store().get_session(&alice_conv).await.unwrap().unwrap().history;
  assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn ask_with_conversation_of_another_document_is_not_found() {
  let (p, kit) = setup();
  ready_report(&p, &kit).await;
  let notes = p.ingest(&upload_event(&kit, "alice/notes.pdf", &REPORT)).await.unwrap();
  let notes_conv = &notes.conversations[0].conversation_id;

  assert!(matches!(
    p.ask("alice", &question(notes_conv, "Anything?")).await,
    Err(Error::NotFound(_))
  ));
}

#[tokio::test]
async fn index_from_another_embedding_model_needs_rebuild() {
  let (p, kit) = setup();
  let doc = ready_report(&p, &kit).await;
  let conv = &doc.conversations[0].conversation_id;

  let keys = kit.blobs.keys();
  let vectors_key = keys.iter().find(|k| k.ends_with(".vectors")).unwrap();
  let metadata_key = keys.iter().find(|k| k.ends_with(".json")).unwrap();
  let current = FlatIndex::from_artifacts(
    &kit.blobs.get(vectors_key).await.unwrap(),
    &kit.blobs.get(metadata_key).await.unwrap(),
  )
  .unwrap();

  let pages = vec!["older".to_string(); current.len()];
  let chunks = Splitter::new(100, 0).chunk_pages(&pages);
  let older = FlatIndex::build("older-model", chunks, vec![vec![1.0, 0.0]; current.len()]).unwrap();
  let (vectors, metadata) = older.to_artifacts().unwrap();
  kit.blobs.insert(vectors_key, vectors);
  kit.blobs.insert(metadata_key, metadata);

  let err = p.ask("alice", &question(conv, "Anything?")).await.unwrap_err();
  assert!(matches!(err, Error::IndexNotReady(_)), "{err}");
  assert!(kit.llm.requests().is_empty());
}

// ─── Deletion ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_records_sessions_and_objects() {
  let (p, kit) = setup();
  let doc = ready_report(&p, &kit).await;
  let first = doc.conversations[0].conversation_id.clone();
  let second = p.create_conversation("alice", &doc.document_id).await.unwrap();
  kit.blobs.insert("alice/report.pdf.bak", "sibling");

  p.delete("alice", &doc.document_id, &first, "report.pdf").await.unwrap();

  assert!(p.store().get_document("alice", &doc.document_id).await.unwrap().is_none());
  assert!(p.store().get_session(&first).await.unwrap().is_none());
  assert!(p.store().get_session(&second).await.unwrap().is_none());
  assert_eq!(kit.blobs.keys(), ["alice/report.pdf.bak"]);
  assert!(matches!(
    p.get_conversation("alice", &doc.document_id, &first).await,
    Err(Error::NotFound(_))
  ));
}

#[tokio::test]
async fn delete_of_absent_records_succeeds() {
  let (p, _kit) = setup();
  p.delete("alice", "ghost", "ghost-conv", "ghost.pdf").await.unwrap();
}

#[tokio::test]
async fn delete_rejects_path_like_file_names() {
  let (p, _kit) = setup();
  assert!(matches!(
    p.delete("alice", "d", "c", "../bob").await,
    Err(Error::InvalidKey(_))
  ));
}

#[tokio::test]
async fn delete_leaves_sessions_of_other_documents() {
  let (p, kit) = setup();
  let alice_doc = ready_report(&p, &kit).await;
  let alice_conv = alice_doc.conversations[0].conversation_id.clone();
  p.ask("alice", &question(&alice_conv, "secret question")).await.unwrap();
  let bob_doc = p.ingest(&upload_event(&kit, "bob/mine.pdf", &REPORT)).await.unwrap();
  let bob_conv = bob_doc.conversations[0].conversation_id.clone();

  p.delete("bob", &bob_doc.document_id, &alice_conv, "mine.pdf").await.unwrap();

  assert!(p.store().get_document("bob", &bob_doc.document_id).await.unwrap().is_none());
  assert!(p.store().get_session(&bob_conv).await.unwrap().is_none());
  let history = p.store().get_session(&alice_conv).await.unwrap().unwrap().history;
  assert_eq!(history.len(), 2);
  assert!(kit.blobs.contains("alice/report.pdf"));
}

// ─── Workers ─────────────────────────────────────────────────────────────────

async fn wait_for(mut done: impl AsyncFnMut() -> bool) {
  for _ in 0..500 {
    if done().await {
      return;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("condition not reached in time");
}

fn fast_retries(max_attempts: u32) -> PipelineConfig {
  PipelineConfig { max_attempts, retry_backoff_ms: 1, ..Default::default() }
}

#[tokio::test]
async fn worker_retries_until_indexing_succeeds() {
  let (p, kit) = setup_with(fast_retries(5));
  let handles = worker::spawn_indexing_workers(&p, 2);
  kit.embedder.fail_next(2);

  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();
  wait_for(async || status(&p, &doc).await == DocStatus::Ready).await;
  assert_eq!(kit.embedder.calls(), 3);

  kit.queue.close();
  for h in handles {
    h.await.unwrap();
  }
}

#[tokio::test]
async fn worker_dead_letters_after_max_attempts() {
  let (p, kit) = setup_with(fast_retries(2));
  let handles = worker::spawn_indexing_workers(&p, 1);
  kit.embedder.fail_next(100);

  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();
  wait_for(async || kit.embedder.calls() >= 2).await;
  tokio::time::sleep(Duration::from_millis(50)).await;

  assert_eq!(kit.embedder.calls(), 2);
  assert_eq!(status(&p, &doc).await, DocStatus::Processing);

  kit.queue.close();
  for h in handles {
    h.await.unwrap();
  }
}

#[tokio::test]
async fn worker_does_not_retry_an_unreadable_upload() {
  let config = PipelineConfig { max_attempts: 5, retry_backoff_ms: 200, ..Default::default() };
  let (p, kit) = setup_with(config);
  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();
  kit.blobs.insert("alice/report.pdf", "garbage");

  let handles = worker::spawn_indexing_workers(&p, 1);
  wait_for(async || status(&p, &doc).await == DocStatus::Processing).await;
  tokio::time::sleep(Duration::from_millis(30)).await;

  // A redelivery would now succeed.
  kit.blobs.insert("alice/report.pdf", StubPdf::encode(&REPORT));
  tokio::time::sleep(Duration::from_millis(400)).await;

  assert_eq!(status(&p, &doc).await, DocStatus::Processing);
  assert_eq!(kit.embedder.calls(), 0);

  kit.queue.close();
  for h in handles {
    h.await.unwrap();
  }
}

#[tokio::test]
async fn listener_ingests_only_pdf_uploads() {
  let (p, kit) = setup();
  let (tx, rx) = mpsc::channel(8);
  let listener = tokio::spawn(worker::run_ingestion_listener(p.clone(), rx));

  kit.blobs.insert("alice/notes.txt", "plain text");
  tx.send(ObjectCreated { key: "alice/notes.txt".into(), size: 10 }).await.unwrap();
  tx.send(upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();
  drop(tx);
  listener.await.unwrap();

  assert_eq!(p.store().document_count(), 1);
  assert_eq!(kit.queue.enqueued().len(), 1);
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn report_scenario_on_sqlite() {
  let kit = TestKit::new();
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let p = Pipeline::new(store, kit.services(), PipelineConfig::default());

  let doc = p.ingest(&upload_event(&kit, "alice/report.pdf", &REPORT)).await.unwrap();
  assert_eq!(doc.pages, 5);
  assert_eq!(doc.filesize, 2048);
  assert_eq!(status(&p, &doc).await, DocStatus::Uploaded);
  assert_eq!(kit.queue.enqueued().len(), 1);

  let job = kit.queue.enqueued().pop().unwrap();
  p.index(&job).await.unwrap();
  assert_eq!(status(&p, &doc).await, DocStatus::Ready);
  assert!(kit.blobs.keys().iter().any(|k| k.starts_with("alice/report.pdf/index.")));

  let conv = doc.conversations[0].conversation_id.clone();
  p.ask("alice", &question(&conv, "What is the summary?")).await.unwrap();
  p.ask("alice", &question(&conv, "And the risks?")).await.unwrap();
  let view = p.get_conversation("alice", &doc.document_id, &conv).await.unwrap();
  assert_eq!(view.messages.len(), 4);

  let listed = p.list_documents("alice").await.unwrap();
  assert_eq!(listed.len(), 1);
}
