//! OpenAI-compatible HTTP clients for embeddings and chat completions.
//!
//! Both clients retry rate limiting (429), server errors and transport
//! failures with exponential backoff (1s, 2s, 4s, ... capped at 32s). Other
//! client errors fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use ragbot_core::{
  Error, Result,
  embed::Embedder,
  llm::{CompletionModel, PromptMessage},
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

const EMBEDDING_SERVICE: &str = "embedding service";
const COMPLETION_SERVICE: &str = "completion service";

/// Connection settings for one OpenAI-compatible endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
  /// API root, e.g. `https://api.openai.com/v1`.
  pub base_url:     String,
  /// Sent as a bearer token when set.
  pub api_key:      Option<String>,
  pub model:        String,
  pub timeout_secs: u64,
  pub max_retries:  u32,
  /// Sampling temperature for completions. Ignored by the embedder.
  pub temperature:  f32,
}

impl Default for OpenAiSettings {
  fn default() -> Self {
    Self {
      base_url:     "https://api.openai.com/v1".to_string(),
      api_key:      None,
      model:        String::new(),
      timeout_secs: 30,
      max_retries:  5,
      temperature:  0.0,
    }
  }
}

// ─── Shared client ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Client {
  http:     reqwest::Client,
  settings: OpenAiSettings,
  service:  &'static str,
}

impl Client {
  fn new(settings: OpenAiSettings, service: &'static str) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(settings.timeout_secs))
      .build()
      .map_err(|e| Error::unavailable(service, e))?;
    Ok(Self { http, settings, service })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
  }

  /// POST `body` to `path`, retrying transient failures.
  async fn post(&self, path: &str, body: &Value) -> Result<Value> {
    let url = self.url(path);
    let mut last_err = None;

    for attempt in 0..=self.settings.max_retries {
      if attempt > 0 {
        let delay = backoff(attempt);
        debug!(service = self.service, attempt, ?delay, "retrying request");
        tokio::time::sleep(delay).await;
      }

      let mut request = self.http.post(&url).json(body);
      if let Some(key) = &self.settings.api_key {
        request = request.bearer_auth(key);
      }

      match request.send().await {
        Ok(response) => {
          let status = response.status();
          if status.is_success() {
            return response
              .json::<Value>()
              .await
              .map_err(|e| Error::unavailable(self.service, e));
          }

          let text = response.text().await.unwrap_or_default();
          let err = format!("{url} returned {status}: {text}");
          if !is_transient(status) {
            return Err(Error::unavailable(self.service, err));
          }
          warn!(service = self.service, %status, attempt, "transient upstream error");
          last_err = Some(err);
        }
        Err(e) => {
          warn!(service = self.service, error = %e, attempt, "request failed");
          last_err = Some(e.to_string());
        }
      }
    }

    Err(Error::unavailable(
      self.service,
      last_err.unwrap_or_else(|| "request failed after retries".to_string()),
    ))
  }
}

fn backoff(attempt: u32) -> Duration { Duration::from_secs(1 << (attempt - 1).min(5)) }

fn is_transient(status: StatusCode) -> bool {
  status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

// ─── Embeddings ──────────────────────────────────────────────────────────────

/// `POST {base_url}/embeddings`.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
  client: Client,
}

impl OpenAiEmbedder {
  pub fn new(settings: OpenAiSettings) -> Result<Self> {
    Ok(Self { client: Client::new(settings, EMBEDDING_SERVICE)? })
  }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
  fn model_name(&self) -> &str { &self.client.settings.model }

  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }
    let body = json!({
      "model": self.client.settings.model,
      "input": texts,
    });
    let response = self.client.post("embeddings", &body).await?;
    let vectors = parse_embeddings(&response)?;
    if vectors.len() != texts.len() {
      return Err(Error::unavailable(
        EMBEDDING_SERVICE,
        format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
      ));
    }
    Ok(vectors)
  }
}

/// Extract `data[].embedding`, ordered by each item's `index` when present.
fn parse_embeddings(json: &Value) -> Result<Vec<Vec<f32>>> {
  let invalid = |what: &str| Error::unavailable(EMBEDDING_SERVICE, format!("invalid response: {what}"));

  let data = json
    .get("data")
    .and_then(Value::as_array)
    .ok_or_else(|| invalid("missing data array"))?;

  let mut items = Vec::with_capacity(data.len());
  for (position, item) in data.iter().enumerate() {
    let embedding = item
      .get("embedding")
      .and_then(Value::as_array)
      .ok_or_else(|| invalid("missing embedding"))?;
    let index = item
      .get("index")
      .and_then(Value::as_u64)
      .map_or(position, |i| i as usize);
    let vector = embedding
      .iter()
      .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| invalid("non-numeric component")))
      .collect::<Result<Vec<f32>>>()?;
    items.push((index, vector));
  }

  items.sort_by_key(|(index, _)| *index);
  Ok(items.into_iter().map(|(_, v)| v).collect())
}

// ─── Chat completions ────────────────────────────────────────────────────────

/// `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
  client: Client,
}

impl OpenAiChat {
  pub fn new(settings: OpenAiSettings) -> Result<Self> {
    Ok(Self { client: Client::new(settings, COMPLETION_SERVICE)? })
  }
}

#[async_trait]
impl CompletionModel for OpenAiChat {
  async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
    let settings = &self.client.settings;
    let body = json!({
      "model": settings.model,
      "temperature": settings.temperature,
      "messages": messages,
    });
    let response = self.client.post("chat/completions", &body).await?;
    parse_completion(&response)
  }
}

fn parse_completion(json: &Value) -> Result<String> {
  json
    .pointer("/choices/0/message/content")
    .and_then(Value::as_str)
    .map(str::to_owned)
    .ok_or_else(|| Error::unavailable(COMPLETION_SERVICE, "invalid response: missing message content"))
}
