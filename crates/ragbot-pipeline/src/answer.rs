//! Query/answer: retrieval-augmented answering over a document's index.

use bytes::Bytes;
use ragbot_core::{
  Error, Result,
  blob::BlobStore,
  index::{FlatIndex, Hit},
  job::AnswerEvent,
  keys::StorageKey,
  llm::PromptMessage,
  session::ChatMessage,
  store::RecordStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Pipeline, indexing::read_manifest, store_err};

/// A question about one document, asked within one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub file_name:       String,
  pub conversation_id: String,
  pub prompt:          String,
}

/// A chunk the answer was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
  pub chunk_index: usize,
  pub page:        u32,
  pub score:       f32,
}

impl From<&Hit> for Source {
  fn from(hit: &Hit) -> Self {
    Self { chunk_index: hit.chunk_index, page: hit.page, score: hit.score }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
  pub text:      String,
  pub sources:   Vec<Source>,
  /// Live connections the answer was pushed to.
  pub delivered: usize,
  /// Live connections the push failed for.
  pub failed:    usize,
}

impl<S: RecordStore> Pipeline<S> {
  /// Answer `question` for `user_id`, record the turn in the conversation's
  /// history and push the answer to the user's subscribed connections.
  #[tracing::instrument(
    skip(self, question),
    fields(file = %question.file_name, conversation_id = %question.conversation_id)
  )]
  pub async fn ask(&self, user_id: &str, question: &Question) -> Result<Answer> {
    let key = StorageKey::new(user_id, &question.file_name)?;
    let not_found = || Error::NotFound(format!("conversation {}", question.conversation_id));

    let owned = self
      .store
      .list_documents(user_id)
      .await
      .map_err(store_err)?
      .iter()
      .any(|d| d.filename == question.file_name && d.has_conversation(&question.conversation_id));
    if !owned {
      return Err(not_found());
    }

    let session = self
      .store
      .get_session(&question.conversation_id)
      .await
      .map_err(store_err)?
      .ok_or_else(not_found)?;

    let index = self.load_index(&key).await?;
    let history = session.recent(self.config.history_turns);

    let standalone = if !history.is_empty() && self.config.condense_question {
      self.condense(history, &question.prompt).await?
    } else {
      question.prompt.clone()
    };
    debug!(%standalone, "retrieval question");

    let query = self
      .services
      .embedder
      .embed(std::slice::from_ref(&standalone))
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| Error::unavailable("embedding service", "no vector returned for query"))?;
    index.check_query(&query)?;
    let hits = index.search(&query, self.config.top_k, self.config.metric);

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(format!(
      "{}\n\n{}",
      self.config.answer_prompt,
      render_context(&hits)
    )));
    messages.extend(history.iter().map(PromptMessage::from));
    messages.push(PromptMessage::user(question.prompt.clone()));
    let text = self.services.llm.complete(&messages).await?;

    let turn = [ChatMessage::human(question.prompt.clone()), ChatMessage::ai(text.clone())];
    let appended = self
      .store
      .append_messages(&question.conversation_id, &turn)
      .await
      .map_err(store_err)?;
    if !appended {
      return Err(not_found());
    }

    let event = AnswerEvent {
      message:         text.clone(),
      conversation_id: question.conversation_id.clone(),
    };
    let (delivered, failed) = self.fan_out(user_id, &event).await;

    let sources: Vec<Source> = hits.iter().map(Source::from).collect();
    info!(
      sources = ?sources.iter().map(|s| (s.chunk_index, s.page)).collect::<Vec<_>>(),
      delivered,
      failed,
      "question answered"
    );
    Ok(Answer { text, sources, delivered, failed })
  }

  /// Resolve the manifest, then load the build it names.
  async fn load_index(&self, key: &StorageKey) -> Result<FlatIndex> {
    let not_ready = |what: &str| Error::IndexNotReady(format!("{key}: {what}"));
    let blobs = self.services.blobs.as_ref();

    let manifest = read_manifest(blobs, key)
      .await?
      .ok_or_else(|| not_ready("no published index"))?;

    let vectors = fetch_artifact(blobs, &manifest.vectors_key)
      .await?
      .ok_or_else(|| not_ready("vectors missing"))?;
    let metadata = fetch_artifact(blobs, &manifest.metadata_key)
      .await?
      .ok_or_else(|| not_ready("metadata missing"))?;

    let index = FlatIndex::from_artifacts(&vectors, &metadata)?;
    if index.len() != manifest.chunk_count {
      return Err(not_ready("artifacts disagree with manifest"));
    }
    Ok(index)
  }

  /// Ask the model to rewrite `prompt` as a question that stands on its own.
  async fn condense(&self, history: &[ChatMessage], prompt: &str) -> Result<String> {
    let transcript = history
      .iter()
      .map(|m| {
        let who = if m.is_human() { "Human" } else { "Assistant" };
        format!("{who}: {}", m.content())
      })
      .collect::<Vec<_>>()
      .join("\n");

    let messages = [
      PromptMessage::system(self.config.condense_prompt.clone()),
      PromptMessage::user(format!(
        "Chat History:\n{transcript}\nFollow Up Input: {prompt}\nStandalone question:"
      )),
    ];
    let rewritten = self.services.llm.complete(&messages).await?;
    let rewritten = rewritten.trim();
    Ok(if rewritten.is_empty() { prompt.to_owned() } else { rewritten.to_owned() })
  }

  /// Push `event` to every live connection of `user_id` subscribed to its
  /// conversation. Returns `(delivered, failed)`.
  async fn fan_out(&self, user_id: &str, event: &AnswerEvent) -> (usize, usize) {
    let connections = match self.services.fanout.connections().await {
      Ok(connections) => connections,
      Err(e) => {
        warn!(error = %e, "could not read connection registry");
        return (0, 0);
      }
    };

    let (mut delivered, mut failed) = (0, 0);
    for conn in connections
      .iter()
      .filter(|c| c.wants(user_id, &event.conversation_id))
    {
      match self.services.fanout.push(&conn.connection_id, event).await {
        Ok(()) => delivered += 1,
        Err(e) => {
          failed += 1;
          warn!(connection_id = %conn.connection_id, error = %e, "answer delivery failed");
        }
      }
    }
    (delivered, failed)
  }
}

async fn fetch_artifact(blobs: &dyn BlobStore, key: &str) -> Result<Option<Bytes>> {
  match blobs.get(key).await {
    Ok(bytes) => Ok(Some(bytes)),
    Err(Error::NotFound(_)) => Ok(None),
    Err(e) => Err(e),
  }
}

fn render_context(hits: &[Hit]) -> String {
  hits
    .iter()
    .map(|h| format!("[page {}]\n{}", h.page, h.text))
    .collect::<Vec<_>>()
    .join("\n\n")
}
