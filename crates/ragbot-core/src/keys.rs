//! Blob key layout.
//!
//! Uploads live at `{userId}/{fileName}`. Everything derived from an upload
//! lives under `{userId}/{fileName}/`:
//!
//! | Key | Content |
//! |-----|---------|
//! | `index.{build}.vectors` | little-endian `f32` matrix, one row per chunk |
//! | `index.{build}.json`    | chunk texts, pages, model and dimensions |
//! | `index.manifest`        | names the published build |

use std::fmt;

use crate::{Error, Result};

/// A validated `{userId}/{fileName}` upload key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
  user:      String,
  file_name: String,
}

impl StorageKey {
  pub fn new(user: &str, file_name: &str) -> Result<Self> {
    let valid = |s: &str| !s.is_empty() && !s.contains('/') && s != "." && s != "..";
    if !valid(user) || !valid(file_name) {
      return Err(Error::InvalidKey(format!("{user}/{file_name}")));
    }
    Ok(Self { user: user.to_owned(), file_name: file_name.to_owned() })
  }

  /// Parse a raw object key of the form `{userId}/{fileName}`.
  pub fn parse(key: &str) -> Result<Self> {
    let (user, file_name) = key
      .split_once('/')
      .ok_or_else(|| Error::InvalidKey(key.to_owned()))?;
    Self::new(user, file_name).map_err(|_| Error::InvalidKey(key.to_owned()))
  }

  pub fn user(&self) -> &str { &self.user }

  pub fn file_name(&self) -> &str { &self.file_name }

  /// Prefix shared by every artifact derived from this upload.
  pub fn derived_prefix(&self) -> String {
    format!("{}/{}/", self.user, self.file_name)
  }

  pub fn manifest_key(&self) -> String {
    format!("{}index.manifest", self.derived_prefix())
  }

  pub fn vectors_key(&self, build_id: &str) -> String {
    format!("{}index.{build_id}.vectors", self.derived_prefix())
  }

  pub fn metadata_key(&self, build_id: &str) -> String {
    format!("{}index.{build_id}.json", self.derived_prefix())
  }

  /// Extract the build id from an artifact key under this upload, if it is
  /// one.
  pub fn build_of<'a>(&self, key: &'a str) -> Option<&'a str> {
    let prefix = self.derived_prefix();
    let rest = key.strip_prefix(prefix.as_str())?.strip_prefix("index.")?;
    rest
      .strip_suffix(".vectors")
      .or_else(|| rest.strip_suffix(".json"))
  }
}

impl fmt::Display for StorageKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.user, self.file_name)
  }
}
