//! Recursive separator text splitter.
//!
//! Splits page text into overlapping chunks of at most `chunk_size`
//! characters. Splitting prefers paragraph breaks, then line breaks, then
//! spaces, and only falls back to cutting between characters when a single
//! word is longer than a chunk.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text.
//! 2. Split on it. Pieces that fit are kept; oversized pieces are split
//!    recursively with the remaining separators.
//! 3. Consecutive fitting pieces are merged back together up to
//!    `chunk_size`; when a chunk is emitted, trailing pieces totalling at
//!    most `chunk_overlap` characters are carried into the next chunk.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// One chunk of document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChunk {
  /// Position in the document, contiguous from 0.
  pub chunk_index: usize,
  /// 1-based page the chunk came from.
  pub page:        u32,
  pub text:        String,
  /// SHA-256 hex digest of `text`.
  pub hash:        String,
}

/// Splitter configuration. Lengths are in characters.
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
  chunk_size:    usize,
  chunk_overlap: usize,
}

impl Splitter {
  /// `chunk_size` is raised to at least 1 and `chunk_overlap` is clamped
  /// below `chunk_size`.
  pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
    let chunk_size = chunk_size.max(1);
    Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
  }

  /// Chunk every page, numbering chunks across the whole document.
  /// Pages without text produce no chunks.
  pub fn chunk_pages(&self, pages: &[String]) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    for (i, page) in pages.iter().enumerate() {
      for text in self.split_text(page) {
        chunks.push(make_chunk(chunks.len(), i as u32 + 1, text));
      }
    }
    chunks
  }

  /// Split a single text into trimmed, non-empty chunks.
  pub fn split_text(&self, text: &str) -> Vec<String> {
    self
      .split(text, &SEPARATORS)
      .into_iter()
      .map(|s| s.trim().to_owned())
      .filter(|s| !s.is_empty())
      .collect()
  }

  fn split(&self, text: &str, separators: &[&str]) -> Vec<String> {
    let pos = separators
      .iter()
      .position(|s| s.is_empty() || text.contains(s))
      .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(pos).copied().unwrap_or("");
    let remaining = separators.get(pos + 1..).unwrap_or(&[]);

    let pieces: Vec<String> = if separator.is_empty() {
      text.chars().map(String::from).collect()
    } else {
      text
        .split(separator)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
    };

    let mut out = Vec::new();
    let mut fitting = Vec::new();
    for piece in pieces {
      if char_len(&piece) <= self.chunk_size {
        fitting.push(piece);
        continue;
      }
      if !fitting.is_empty() {
        out.extend(self.merge(&fitting, separator));
        fitting.clear();
      }
      if remaining.is_empty() {
        out.push(piece);
      } else {
        out.extend(self.split(&piece, remaining));
      }
    }
    if !fitting.is_empty() {
      out.extend(self.merge(&fitting, separator));
    }
    out
  }

  fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut docs = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
      let len = char_len(piece);
      let joined_len = |current: &VecDeque<&str>| if current.is_empty() { 0 } else { sep_len };

      if total + len + joined_len(&current) > self.chunk_size && !current.is_empty() {
        docs.push(join(&current, separator));
        while total > self.chunk_overlap
          || (total + len + joined_len(&current) > self.chunk_size && total > 0)
        {
          let Some(first) = current.pop_front() else { break };
          total -= char_len(first) + joined_len(&current);
        }
      }

      current.push_back(piece);
      total += len + if current.len() > 1 { sep_len } else { 0 };
    }

    if !current.is_empty() {
      docs.push(join(&current, separator));
    }
    docs
  }
}

fn char_len(s: &str) -> usize { s.chars().count() }

fn join(parts: &VecDeque<&str>, separator: &str) -> String {
  parts.iter().copied().collect::<Vec<_>>().join(separator)
}

fn make_chunk(chunk_index: usize, page: u32, text: String) -> TextChunk {
  let hash = hex::encode(Sha256::digest(text.as_bytes()));
  TextChunk { chunk_index, page, text, hash }
}
