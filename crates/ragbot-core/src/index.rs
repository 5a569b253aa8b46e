//! Flat vector index and its two-artifact persistence format.
//!
//! An index build is stored as two blobs plus a manifest:
//!
//! - the vectors blob, a row-major matrix of little-endian `f32`, one row per
//!   chunk;
//! - the metadata blob, JSON holding the model name, the dimension count and
//!   each chunk's text and page.
//!
//! The manifest names the build that is currently published. It is written
//! last, so a reader that follows the manifest never sees a half-written
//! build.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, chunk::TextChunk, embed::Metric};

// ─── Entries ─────────────────────────────────────────────────────────────────

/// The part of a chunk kept next to its vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
  pub chunk_index: usize,
  pub page:        u32,
  pub text:        String,
}

impl From<TextChunk> for ChunkMeta {
  fn from(c: TextChunk) -> Self {
    Self { chunk_index: c.chunk_index, page: c.page, text: c.text }
  }
}

/// One retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hit {
  pub chunk_index: usize,
  pub page:        u32,
  pub text:        String,
  pub score:       f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
  model:  String,
  dims:   usize,
  chunks: Vec<ChunkMeta>,
}

// ─── Manifest ────────────────────────────────────────────────────────────────

/// Points at the published build of a document's index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexManifest {
  pub build_id:     String,
  pub vectors_key:  String,
  pub metadata_key: String,
  pub model:        String,
  pub chunk_count:  usize,
  pub created:      DateTime<Utc>,
}

impl IndexManifest {
  pub fn to_bytes(&self) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(self)?))
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    serde_json::from_slice(bytes)
      .map_err(|e| Error::IndexNotReady(format!("unreadable manifest: {e}")))
  }
}

// ─── Index ───────────────────────────────────────────────────────────────────

/// Brute-force nearest-neighbour index over one document's chunks.
#[derive(Debug, Clone)]
pub struct FlatIndex {
  model:   String,
  dims:    usize,
  chunks:  Vec<ChunkMeta>,
  vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
  /// Pair each chunk with its vector. Fails with [`Error::Malformed`] when
  /// the counts differ or the vectors are not all the same length.
  pub fn build(
    model: impl Into<String>,
    chunks: Vec<TextChunk>,
    vectors: Vec<Vec<f32>>,
  ) -> Result<Self> {
    if chunks.len() != vectors.len() {
      return Err(Error::Malformed(format!(
        "{} chunks but {} vectors",
        chunks.len(),
        vectors.len()
      )));
    }
    let dims = vectors.first().map_or(0, Vec::len);
    if vectors.iter().any(|v| v.len() != dims) {
      return Err(Error::Malformed("embedding dimensions differ".into()));
    }
    Ok(Self {
      model: model.into(),
      dims,
      chunks: chunks.into_iter().map(ChunkMeta::from).collect(),
      vectors,
    })
  }

  pub fn model(&self) -> &str { &self.model }

  pub fn dims(&self) -> usize { self.dims }

  pub fn len(&self) -> usize { self.chunks.len() }

  pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

  /// Fails with [`Error::IndexNotReady`] when `query` cannot be compared
  /// against a non-empty index, which means the index must be rebuilt with
  /// the current embedding model.
  pub fn check_query(&self, query: &[f32]) -> Result<()> {
    if !self.is_empty() && query.len() != self.dims {
      return Err(Error::IndexNotReady(format!(
        "query has {} dimensions but the index ({}) has {}; rebuild needed",
        query.len(),
        self.model,
        self.dims
      )));
    }
    Ok(())
  }

  /// The `k` best-scoring chunks for `query`, best first.
  pub fn search(&self, query: &[f32], k: usize, metric: Metric) -> Vec<Hit> {
    let mut scored: Vec<(usize, f32)> = self
      .vectors
      .iter()
      .enumerate()
      .map(|(i, v)| (i, metric.score(query, v)))
      .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);

    scored
      .into_iter()
      .map(|(i, score)| {
        let c = &self.chunks[i];
        Hit { chunk_index: c.chunk_index, page: c.page, text: c.text.clone(), score }
      })
      .collect()
  }

  /// Encode as `(vectors, metadata)` blobs.
  pub fn to_artifacts(&self) -> Result<(Bytes, Bytes)> {
    let mut vectors = Vec::with_capacity(self.vectors.len() * self.dims * 4);
    for row in &self.vectors {
      for v in row {
        vectors.extend_from_slice(&v.to_le_bytes());
      }
    }
    let metadata = serde_json::to_vec(&Metadata {
      model:  self.model.clone(),
      dims:   self.dims,
      chunks: self.chunks.clone(),
    })?;
    Ok((Bytes::from(vectors), Bytes::from(metadata)))
  }

  /// Decode the two artifacts of one build. Inconsistent artifacts fail with
  /// [`Error::IndexNotReady`].
  pub fn from_artifacts(vectors: &[u8], metadata: &[u8]) -> Result<Self> {
    let meta: Metadata = serde_json::from_slice(metadata)
      .map_err(|e| Error::IndexNotReady(format!("unreadable index metadata: {e}")))?;

    let expected = meta.chunks.len() * meta.dims * 4;
    if vectors.len() != expected {
      return Err(Error::IndexNotReady(format!(
        "vectors blob is {} bytes, expected {expected}",
        vectors.len()
      )));
    }

    let floats: Vec<f32> = vectors
      .chunks_exact(4)
      .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
      .collect();
    let rows = if meta.dims == 0 {
      vec![Vec::new(); meta.chunks.len()]
    } else {
      floats.chunks(meta.dims).map(<[f32]>::to_vec).collect()
    };

    Ok(Self { model: meta.model, dims: meta.dims, chunks: meta.chunks, vectors: rows })
  }
}
