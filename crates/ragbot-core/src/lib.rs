//! Core types and trait definitions for the RAGBot document Q&A service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it: storage backends implement
//! [`store::RecordStore`], adapters implement the collaborator traits in
//! [`blob`], [`queue`], [`fanout`], [`pdf`], [`embed`] and [`llm`], and the
//! pipeline drives them.

pub mod blob;
pub mod chunk;
pub mod document;
pub mod embed;
pub mod error;
pub mod fanout;
pub mod ids;
pub mod index;
pub mod job;
pub mod keys;
pub mod llm;
pub mod pdf;
pub mod queue;
pub mod session;
pub mod store;

pub use error::{Error, Result};
