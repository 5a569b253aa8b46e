//! Embedding capability and vector similarity helpers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
  /// Model identifier recorded alongside each index build.
  fn model_name(&self) -> &str;

  /// Embed `texts`, returning one vector per input in input order.
  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// How retrieval scores a chunk against the query. Higher is better for
/// every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
  #[default]
  Cosine,
  DotProduct,
  /// Negated Euclidean distance.
  Euclidean,
}

impl Metric {
  /// Score `b` against `a`. Mismatched or empty vectors score
  /// `f32::NEG_INFINITY` so they sort last.
  pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
      return f32::NEG_INFINITY;
    }
    match self {
      Self::Cosine => cosine_similarity(a, b),
      Self::DotProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
      Self::Euclidean => {
        -a.iter()
          .zip(b)
          .map(|(x, y)| (x - y) * (x - y))
          .sum::<f32>()
          .sqrt()
      }
    }
  }
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` when either vector has zero
/// length or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return 0.0;
  }

  let mut dot = 0.0f32;
  let mut norm_a = 0.0f32;
  let mut norm_b = 0.0f32;
  for (x, y) in a.iter().zip(b) {
    dot += x * y;
    norm_a += x * x;
    norm_b += y * y;
  }

  let denom = norm_a.sqrt() * norm_b.sqrt();
  if denom < f32::EPSILON {
    return 0.0;
  }
  dot / denom
}
