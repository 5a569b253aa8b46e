//! Local-filesystem blob store.
//!
//! Keys have the shape `{user}/{rest}`. Each object lives at
//! `{root}/{enc(user)}/{enc(rest)}` where `enc` is percent-encoding, so an
//! upload `alice/report.pdf` and its derived objects
//! `alice/report.pdf/index/...` are sibling files rather than a file and a
//! directory of the same name.
//!
//! Writes go to a temporary file under `{root}/%staging` and are renamed into
//! place, which makes `put` atomic per object.

use std::{
  io::{self, Write},
  path::PathBuf,
};

use async_trait::async_trait;
use bytes::Bytes;
use ragbot_core::{Error, Result, blob::BlobStore};
use urlencoding::{decode, encode};

/// `%st` is not a valid percent escape, so no encoded user can collide.
const STAGING_DIR: &str = "%staging";

#[derive(Debug, Clone)]
pub struct FsBlobStore {
  root: PathBuf,
}

impl FsBlobStore {
  /// Open (creating if needed) a store rooted at `root`.
  pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
    let root = root.into();
    tokio::fs::create_dir_all(root.join(STAGING_DIR))
      .await
      .map_err(io_err)?;
    Ok(Self { root })
  }

  fn user_dir(&self, user: &str) -> PathBuf { self.root.join(&*encode(user)) }

  fn path_of(&self, key: &str) -> Result<PathBuf> {
    let (user, rest) = split_key(key)?;
    Ok(self.user_dir(user).join(&*encode(rest)))
  }

  /// Decoded names of every user directory.
  async fn users(&self) -> Result<Vec<String>> {
    let mut users = Vec::new();
    let mut entries = tokio::fs::read_dir(&self.root).await.map_err(io_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
      let name = entry.file_name();
      let Some(name) = name.to_str() else { continue };
      if name == STAGING_DIR {
        continue;
      }
      if let Ok(user) = decode(name) {
        users.push(user.into_owned());
      }
    }
    Ok(users)
  }
}

#[async_trait]
impl BlobStore for FsBlobStore {
  async fn put(&self, key: &str, body: Bytes) -> Result<()> {
    let path = self.path_of(key)?;
    let staging = self.root.join(STAGING_DIR);

    tokio::task::spawn_blocking(move || -> io::Result<()> {
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
      }
      let mut tmp = tempfile::NamedTempFile::new_in(&staging)?;
      tmp.write_all(&body)?;
      tmp.as_file().sync_all()?;
      tmp.persist(&path).map_err(|e| e.error)?;
      Ok(())
    })
    .await
    .map_err(|e| Error::unavailable("blob store", e))?
    .map_err(io_err)
  }

  async fn get(&self, key: &str) -> Result<Bytes> {
    let path = self.path_of(key)?;
    match tokio::fs::read(&path).await {
      Ok(body) => Ok(Bytes::from(body)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound(format!("object {key}"))),
      Err(e) => Err(io_err(e)),
    }
  }

  async fn list(&self, prefix: &str) -> Result<Vec<String>> {
    let users = match prefix.split_once('/') {
      Some((user, _)) => vec![user.to_owned()],
      None => self.users().await?,
    };

    let mut keys = Vec::new();
    for user in users {
      let mut entries = match tokio::fs::read_dir(self.user_dir(&user)).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
        Err(e) => return Err(io_err(e)),
      };
      while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Ok(rest) = decode(name) else { continue };
        let key = format!("{user}/{rest}");
        if key.starts_with(prefix) {
          keys.push(key);
        }
      }
    }
    keys.sort();
    Ok(keys)
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let path = self.path_of(key)?;
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(io_err(e)),
    }
  }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
  match key.split_once('/') {
    Some((user, rest)) if !user.is_empty() && !rest.is_empty() => Ok((user, rest)),
    _ => Err(Error::InvalidKey(key.to_owned())),
  }
}

fn io_err(e: io::Error) -> Error { Error::unavailable("blob store", e) }
