//! SQL schema for the RAGBot SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS documents (
    user_id      TEXT    NOT NULL,
    document_id  TEXT    NOT NULL,
    filename     TEXT    NOT NULL,
    created      TEXT    NOT NULL,   -- RFC 3339 UTC, fixed width
    pages        INTEGER NOT NULL,
    filesize     INTEGER NOT NULL,
    doc_status   TEXT    NOT NULL,   -- 'UPLOADED' | 'PROCESSING' | 'READY'
    status_rank  INTEGER NOT NULL,   -- lifecycle position of doc_status
    PRIMARY KEY (user_id, document_id)
);

-- Append-only per document; rowid order is append order.
CREATE TABLE IF NOT EXISTS conversations (
    user_id         TEXT NOT NULL,
    document_id     TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    created         TEXT NOT NULL,
    FOREIGN KEY (user_id, document_id)
      REFERENCES documents(user_id, document_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS messages (
    session_id   TEXT    NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    seq          INTEGER NOT NULL,
    message_json TEXT    NOT NULL,
    PRIMARY KEY (session_id, seq)
);

CREATE INDEX IF NOT EXISTS documents_created_idx     ON documents(user_id, created);
CREATE INDEX IF NOT EXISTS conversations_document_idx ON conversations(user_id, document_id);

PRAGMA user_version = 1;
";
