//! Server configuration.
//!
//! Read from a TOML file (optional) overlaid with `RAGBOT_`-prefixed
//! environment variables. Nested keys use `__`, e.g.
//! `RAGBOT_EMBEDDING__API_KEY` or `RAGBOT_PIPELINE__TOP_K`. Every field has a
//! default, so an empty configuration starts a working local server.

use std::path::{Path, PathBuf};

use ragbot_pipeline::PipelineConfig;
use ragbot_providers::OpenAiSettings;
use serde::Deserialize;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  #[default]
  Text,
  Json,
}

/// Runtime server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  /// SQLite database holding documents and sessions.
  pub store_path:           PathBuf,
  /// Directory backing the blob store.
  pub blob_root:            PathBuf,
  /// Header carrying the caller's user id, set by the fronting proxy.
  pub identity_header:      String,
  pub log_format:           LogFormat,
  pub indexing_workers:     usize,
  /// Pending indexing jobs before `enqueue` waits.
  pub queue_capacity:       usize,
  /// Pending upload notifications before uploads wait.
  pub upload_backlog:       usize,
  pub max_upload_bytes:     usize,
  pub request_timeout_secs: u64,
  pub pipeline:             PipelineConfig,
  pub embedding:            OpenAiSettings,
  pub completion:           OpenAiSettings,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                 "127.0.0.1".to_string(),
      port:                 8080,
      store_path:           PathBuf::from("ragbot.db"),
      blob_root:            PathBuf::from("blobs"),
      identity_header:      ragbot_api::DEFAULT_IDENTITY_HEADER.to_string(),
      log_format:           LogFormat::Text,
      indexing_workers:     2,
      queue_capacity:       1024,
      upload_backlog:       256,
      max_upload_bytes:     ragbot_api::DEFAULT_MAX_UPLOAD_BYTES,
      request_timeout_secs: 120,
      pipeline:             PipelineConfig::default(),
      embedding:            OpenAiSettings {
        model: DEFAULT_EMBEDDING_MODEL.to_string(),
        ..OpenAiSettings::default()
      },
      completion:           OpenAiSettings {
        model: DEFAULT_COMPLETION_MODEL.to_string(),
        ..OpenAiSettings::default()
      },
    }
  }
}

impl ServerConfig {
  /// Load `path` (if it exists) under the `RAGBOT_` environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    let mut cfg: Self = config::Config::builder()
      .add_source(config::File::from(path.to_path_buf()).required(false))
      .add_source(
        config::Environment::with_prefix("RAGBOT")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()?;

    // A partially configured `[embedding]` or `[completion]` table falls
    // back to the provider defaults, which leave the model blank.
    if cfg.embedding.model.is_empty() {
      cfg.embedding.model = DEFAULT_EMBEDDING_MODEL.to_string();
    }
    if cfg.completion.model.is_empty() {
      cfg.completion.model = DEFAULT_COMPLETION_MODEL.to_string();
    }
    Ok(cfg)
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
