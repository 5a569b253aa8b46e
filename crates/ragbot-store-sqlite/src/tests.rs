//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use ragbot_core::{
  document::{ConversationSummary, DocStatus, Document},
  session::{ChatMessage, Session},
  store::RecordStore,
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn document(user: &str, id: &str) -> Document {
  Document {
    user_id:       user.into(),
    document_id:   id.into(),
    filename:      format!("{id}.pdf"),
    created:       Utc::now(),
    pages:         3,
    filesize:      1024,
    doc_status:    DocStatus::Uploaded,
    conversations: vec![ConversationSummary {
      conversation_id: format!("{id}-conv"),
      created:         Utc::now(),
    }],
  }
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_and_get_document() {
  let s = store().await;
  let doc = document("alice", "d1");
  s.put_document(&doc).await.unwrap();

  let fetched = s.get_document("alice", "d1").await.unwrap().unwrap();
  assert_eq!(fetched.filename, "d1.pdf");
  assert_eq!(fetched.pages, 3);
  assert_eq!(fetched.filesize, 1024);
  assert_eq!(fetched.doc_status, DocStatus::Uploaded);
  assert_eq!(fetched.conversations.len(), 1);
  assert_eq!(fetched.conversations[0].conversation_id, "d1-conv");
}

#[tokio::test]
async fn documents_are_scoped_to_their_owner() {
  let s = store().await;
  s.put_document(&document("alice", "d1")).await.unwrap();

  assert!(s.get_document("bob", "d1").await.unwrap().is_none());
  assert!(s.list_documents("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn list_documents_newest_first() {
  let s = store().await;
  let mut older = document("alice", "old");
  older.created = Utc::now() - Duration::hours(1);
  let newer = document("alice", "new");
  s.put_document(&older).await.unwrap();
  s.put_document(&newer).await.unwrap();
  s.put_document(&document("bob", "other")).await.unwrap();

  let docs = s.list_documents("alice").await.unwrap();
  let ids: Vec<_> = docs.iter().map(|d| d.document_id.as_str()).collect();
  assert_eq!(ids, ["new", "old"]);
  assert!(docs.iter().all(|d| d.conversations.len() == 1));
}

#[tokio::test]
async fn put_document_replaces_conversations() {
  let s = store().await;
  let mut doc = document("alice", "d1");
  s.put_document(&doc).await.unwrap();

  doc.conversations.clear();
  s.put_document(&doc).await.unwrap();

  let fetched = s.get_document("alice", "d1").await.unwrap().unwrap();
  assert!(fetched.conversations.is_empty());
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn status_only_moves_forward() {
  let s = store().await;
  s.put_document(&document("alice", "d1")).await.unwrap();

  assert!(s.advance_status("alice", "d1", DocStatus::Processing).await.unwrap());
  assert!(s.advance_status("alice", "d1", DocStatus::Ready).await.unwrap());
  assert!(!s.advance_status("alice", "d1", DocStatus::Processing).await.unwrap());
  assert!(!s.advance_status("alice", "d1", DocStatus::Ready).await.unwrap());

  let fetched = s.get_document("alice", "d1").await.unwrap().unwrap();
  assert_eq!(fetched.doc_status, DocStatus::Ready);
}

#[tokio::test]
async fn advance_status_on_missing_document_is_a_no_op() {
  let s = store().await;
  assert!(!s.advance_status("alice", "ghost", DocStatus::Ready).await.unwrap());
}

// ─── Conversations ───────────────────────────────────────────────────────────

#[tokio::test]
async fn append_conversation_keeps_existing_entries() {
  let s = store().await;
  s.put_document(&document("alice", "d1")).await.unwrap();

  let conv = ConversationSummary { conversation_id: "c2".into(), created: Utc::now() };
  assert!(s.append_conversation("alice", "d1", &conv).await.unwrap());

  let fetched = s.get_document("alice", "d1").await.unwrap().unwrap();
  let ids: Vec<_> = fetched
    .conversations
    .iter()
    .map(|c| c.conversation_id.as_str())
    .collect();
  assert_eq!(ids, ["d1-conv", "c2"]);
}

#[tokio::test]
async fn append_conversation_to_missing_document_returns_false() {
  let s = store().await;
  let conv = ConversationSummary { conversation_id: "c".into(), created: Utc::now() };
  assert!(!s.append_conversation("alice", "ghost", &conv).await.unwrap());
}

#[tokio::test]
async fn concurrent_conversation_appends_all_survive() {
  let s = store().await;
  s.put_document(&document("alice", "d1")).await.unwrap();

  let mut tasks = tokio::task::JoinSet::new();
  for i in 0..20 {
    let s = s.clone();
    tasks.spawn(async move {
      let conv = ConversationSummary {
        conversation_id: format!("c{i}"),
        created:         Utc::now(),
      };
      s.append_conversation("alice", "d1", &conv).await.unwrap()
    });
  }
  while let Some(res) = tasks.join_next().await {
    assert!(res.unwrap());
  }

  let fetched = s.get_document("alice", "d1").await.unwrap().unwrap();
  assert_eq!(fetched.conversations.len(), 21);
}

#[tokio::test]
async fn delete_document_is_idempotent() {
  let s = store().await;
  s.put_document(&document("alice", "d1")).await.unwrap();

  s.delete_document("alice", "d1").await.unwrap();
  assert!(s.get_document("alice", "d1").await.unwrap().is_none());
  s.delete_document("alice", "d1").await.unwrap();
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_round_trip() {
  let s = store().await;
  let mut session = Session::empty("c1");
  session.history.push(ChatMessage::human("hi"));
  s.put_session(&session).await.unwrap();

  let fetched = s.get_session("c1").await.unwrap().unwrap();
  assert_eq!(fetched, session);
  assert!(s.get_session("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn empty_session_exists() {
  let s = store().await;
  s.put_session(&Session::empty("c1")).await.unwrap();
  let fetched = s.get_session("c1").await.unwrap().unwrap();
  assert!(fetched.history.is_empty());
}

#[tokio::test]
async fn append_messages_preserves_order() {
  let s = store().await;
  s.put_session(&Session::empty("c1")).await.unwrap();

  s.append_messages("c1", &[ChatMessage::human("q1"), ChatMessage::ai("a1")])
    .await
    .unwrap();
  s.append_messages("c1", &[ChatMessage::human("q2"), ChatMessage::ai("a2")])
    .await
    .unwrap();

  let history = s.get_session("c1").await.unwrap().unwrap().history;
  let contents: Vec<_> = history.iter().map(ChatMessage::content).collect();
  assert_eq!(contents, ["q1", "a1", "q2", "a2"]);
}

#[tokio::test]
async fn append_messages_to_missing_session_returns_false() {
  let s = store().await;
  assert!(!s.append_messages("ghost", &[ChatMessage::human("q")]).await.unwrap());
  assert!(s.get_session("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_turn_appends_stay_paired() {
  let s = store().await;
  s.put_session(&Session::empty("c1")).await.unwrap();

  let mut tasks = tokio::task::JoinSet::new();
  for i in 0..10 {
    let s = s.clone();
    tasks.spawn(async move {
      let turn = [ChatMessage::human(format!("q{i}")), ChatMessage::ai(format!("a{i}"))];
      s.append_messages("c1", &turn).await.unwrap()
    });
  }
  while let Some(res) = tasks.join_next().await {
    assert!(res.unwrap());
  }

  let history = s.get_session("c1").await.unwrap().unwrap().history;
  assert_eq!(history.len(), 20);
  for pair in history.chunks(2) {
    assert!(pair[0].is_human());
    assert!(!pair[1].is_human());
    assert_eq!(&pair[0].content()[1..], &pair[1].content()[1..]);
  }
}

#[tokio::test]
async fn delete_session_is_idempotent() {
  let s = store().await;
  s.put_session(&Session::empty("c1")).await.unwrap();
  s.delete_session("c1").await.unwrap();
  assert!(s.get_session("c1").await.unwrap().is_none());
  s.delete_session("c1").await.unwrap();
}

#[tokio::test]
async fn open_file_store_persists_across_connections() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("records.db");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.put_document(&document("alice", "d1")).await.unwrap();
  }
  let s = SqliteStore::open(&path).await.unwrap();
  assert!(s.get_document("alice", "d1").await.unwrap().is_some());
}
