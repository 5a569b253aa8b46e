//! [`SqliteStore`]: the SQLite implementation of [`RecordStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;

use ragbot_core::{
  document::{ConversationSummary, DocStatus, Document},
  session::{ChatMessage, Session},
  store::RecordStore,
};

use crate::{
  encode::{
    RawConversation, RawDocument, decode_message, encode_dt, encode_message,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A RAGBot record store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

const DOCUMENT_COLUMNS: &str =
  "user_id, document_id, filename, created, pages, filesize, doc_status";

fn raw_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDocument> {
  Ok(RawDocument {
    user_id:       row.get(0)?,
    document_id:   row.get(1)?,
    filename:      row.get(2)?,
    created:       row.get(3)?,
    pages:         row.get(4)?,
    filesize:      row.get(5)?,
    doc_status:    row.get(6)?,
    conversations: Vec::new(),
  })
}

fn load_conversations(
  conn: &rusqlite::Connection,
  user_id: &str,
  document_id: &str,
) -> rusqlite::Result<Vec<RawConversation>> {
  let mut stmt = conn.prepare_cached(
    "SELECT conversation_id, created FROM conversations
     WHERE user_id = ?1 AND document_id = ?2
     ORDER BY rowid",
  )?;
  stmt
    .query_map(rusqlite::params![user_id, document_id], |row| {
      Ok(RawConversation { conversation_id: row.get(0)?, created: row.get(1)? })
    })?
    .collect()
}

fn document_exists(
  conn: &rusqlite::Connection,
  user_id: &str,
  document_id: &str,
) -> rusqlite::Result<bool> {
  Ok(conn
    .query_row(
      "SELECT 1 FROM documents WHERE user_id = ?1 AND document_id = ?2",
      rusqlite::params![user_id, document_id],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false))
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  // ── Documents ─────────────────────────────────────────────────────────────

  async fn put_document(&self, document: &Document) -> Result<()> {
    let user_id     = document.user_id.clone();
    let document_id = document.document_id.clone();
    let filename    = document.filename.clone();
    let created     = encode_dt(document.created);
    let pages       = i64::from(document.pages);
    let filesize    = i64::try_from(document.filesize)
      .map_err(|_| Error::Decode(format!("file size {}", document.filesize)))?;
    let status      = document.doc_status.as_ref().to_owned();
    let rank        = document.doc_status.rank();
    let conversations: Vec<(String, String)> = document
      .conversations
      .iter()
      .map(|c| (c.conversation_id.clone(), encode_dt(c.created)))
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO documents (
             user_id, document_id, filename, created, pages, filesize,
             doc_status, status_rank
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT (user_id, document_id) DO UPDATE SET
             filename    = excluded.filename,
             created     = excluded.created,
             pages       = excluded.pages,
             filesize    = excluded.filesize,
             doc_status  = excluded.doc_status,
             status_rank = excluded.status_rank",
          rusqlite::params![
            user_id, document_id, filename, created, pages, filesize, status, rank,
          ],
        )?;
        tx.execute(
          "DELETE FROM conversations WHERE user_id = ?1 AND document_id = ?2",
          rusqlite::params![user_id, document_id],
        )?;
        for (conversation_id, created) in &conversations {
          tx.execute(
            "INSERT INTO conversations (user_id, document_id, conversation_id, created)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, document_id, conversation_id, created],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_document(
    &self,
    user_id: &str,
    document_id: &str,
  ) -> Result<Option<Document>> {
    let user_id     = user_id.to_owned();
    let document_id = document_id.to_owned();

    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {DOCUMENT_COLUMNS} FROM documents
           WHERE user_id = ?1 AND document_id = ?2"
        );
        let mut raw = conn
          .query_row(&sql, rusqlite::params![user_id, document_id], raw_document)
          .optional()?;
        if let Some(doc) = raw.as_mut() {
          doc.conversations = load_conversations(conn, &user_id, &document_id)?;
        }
        Ok(raw)
      })
      .await?;

    raw.map(RawDocument::into_document).transpose()
  }

  async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>> {
    let user_id = user_id.to_owned();

    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {DOCUMENT_COLUMNS} FROM documents
           WHERE user_id = ?1
           ORDER BY created DESC, document_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt
          .query_map(rusqlite::params![user_id], raw_document)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        for doc in &mut rows {
          doc.conversations = load_conversations(conn, &doc.user_id, &doc.document_id)?;
        }
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }

  async fn advance_status(
    &self,
    user_id: &str,
    document_id: &str,
    status: DocStatus,
  ) -> Result<bool> {
    let user_id     = user_id.to_owned();
    let document_id = document_id.to_owned();
    let name        = status.as_ref().to_owned();
    let rank        = status.rank();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE documents SET doc_status = ?3, status_rank = ?4
           WHERE user_id = ?1 AND document_id = ?2 AND status_rank < ?4",
          rusqlite::params![user_id, document_id, name, rank],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  async fn append_conversation(
    &self,
    user_id: &str,
    document_id: &str,
    conversation: &ConversationSummary,
  ) -> Result<bool> {
    let user_id         = user_id.to_owned();
    let document_id     = document_id.to_owned();
    let conversation_id = conversation.conversation_id.clone();
    let created         = encode_dt(conversation.created);

    let appended = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !document_exists(&tx, &user_id, &document_id)? {
          return Ok(false);
        }
        tx.execute(
          "INSERT INTO conversations (user_id, document_id, conversation_id, created)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![user_id, document_id, conversation_id, created],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(appended)
  }

  async fn delete_document(&self, user_id: &str, document_id: &str) -> Result<()> {
    let user_id     = user_id.to_owned();
    let document_id = document_id.to_owned();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM conversations WHERE user_id = ?1 AND document_id = ?2",
          rusqlite::params![user_id, document_id],
        )?;
        tx.execute(
          "DELETE FROM documents WHERE user_id = ?1 AND document_id = ?2",
          rusqlite::params![user_id, document_id],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn put_session(&self, session: &Session) -> Result<()> {
    let session_id = session.session_id.clone();
    let messages   = session
      .history
      .iter()
      .map(encode_message)
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO sessions (session_id) VALUES (?1)
           ON CONFLICT (session_id) DO NOTHING",
          rusqlite::params![session_id],
        )?;
        tx.execute(
          "DELETE FROM messages WHERE session_id = ?1",
          rusqlite::params![session_id],
        )?;
        for (seq, json) in messages.iter().enumerate() {
          tx.execute(
            "INSERT INTO messages (session_id, seq, message_json) VALUES (?1, ?2, ?3)",
            rusqlite::params![session_id, seq as i64, json],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
    let id = session_id.to_owned();

    let raw: Option<Vec<String>> = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM sessions WHERE session_id = ?1",
            rusqlite::params![id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(None);
        }

        let mut stmt = conn.prepare(
          "SELECT message_json FROM messages WHERE session_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(Some(rows))
      })
      .await?;

    let Some(rows) = raw else { return Ok(None) };
    let history = rows
      .iter()
      .map(|s| decode_message(s))
      .collect::<Result<Vec<_>>>()?;
    Ok(Some(Session { session_id: session_id.to_owned(), history }))
  }

  async fn append_messages(
    &self,
    session_id: &str,
    messages: &[ChatMessage],
  ) -> Result<bool> {
    let id      = session_id.to_owned();
    let encoded = messages
      .iter()
      .map(encode_message)
      .collect::<Result<Vec<_>>>()?;

    let appended = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM sessions WHERE session_id = ?1",
            rusqlite::params![id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(false);
        }

        let next: i64 = tx.query_row(
          "SELECT COALESCE(MAX(seq) + 1, 0) FROM messages WHERE session_id = ?1",
          rusqlite::params![id],
          |row| row.get(0),
        )?;
        for (offset, json) in encoded.iter().enumerate() {
          tx.execute(
            "INSERT INTO messages (session_id, seq, message_json) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, next + offset as i64, json],
          )?;
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(appended)
  }

  async fn delete_session(&self, session_id: &str) -> Result<()> {
    let id = session_id.to_owned();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages WHERE session_id = ?1", rusqlite::params![id])?;
        tx.execute("DELETE FROM sessions WHERE session_id = ?1", rusqlite::params![id])?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
