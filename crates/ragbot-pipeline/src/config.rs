//! Tunables for the indexing and answering stages.

use ragbot_core::embed::Metric;
use serde::Deserialize;

/// Rewrites a follow-up question using the chat history.
pub const DEFAULT_CONDENSE_PROMPT: &str = "Given the following conversation and a follow up \
question, rephrase the follow up question to be a standalone question, in its original \
language. Reply with the standalone question only.";

/// Instructions placed ahead of the retrieved context.
pub const DEFAULT_ANSWER_PROMPT: &str = "Use the following pieces of context to answer the \
question at the end. If you don't know the answer, just say that you don't know, don't try \
to make up an answer.";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Maximum chunk length in characters.
  pub chunk_size:        usize,
  /// Characters carried over between consecutive chunks.
  pub chunk_overlap:     usize,
  /// Texts sent per embedding request.
  pub embed_batch_size:  usize,
  /// Chunks retrieved per question.
  pub top_k:             usize,
  pub metric:            Metric,
  /// Question/answer pairs of history replayed to the model. `None` replays
  /// all of it.
  pub history_turns:     Option<usize>,
  /// Rewrite follow-up questions into standalone ones before retrieval.
  pub condense_question: bool,
  /// Deliveries of one indexing job before it is dead-lettered.
  pub max_attempts:      u32,
  /// Delay before the first retry; doubles on each further attempt.
  pub retry_backoff_ms:  u64,
  pub condense_prompt:   String,
  pub answer_prompt:     String,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      chunk_size:        1000,
      chunk_overlap:     100,
      embed_batch_size:  64,
      top_k:             4,
      metric:            Metric::Cosine,
      history_turns:     None,
      condense_question: true,
      max_attempts:      5,
      retry_backoff_ms:  1000,
      condense_prompt:   DEFAULT_CONDENSE_PROMPT.to_owned(),
      answer_prompt:     DEFAULT_ANSWER_PROMPT.to_owned(),
    }
  }
}

impl PipelineConfig {
  /// Delay before redelivering a job that failed on `attempt` (1-based):
  /// `retry_backoff_ms * 2^(attempt - 1)`, with the exponent capped at 5.
  pub fn retry_delay(&self, attempt: u32) -> std::time::Duration {
    let shift = attempt.saturating_sub(1).min(5);
    std::time::Duration::from_millis(self.retry_backoff_ms.saturating_mul(1 << shift))
  }
}
