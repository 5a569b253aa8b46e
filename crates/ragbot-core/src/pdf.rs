//! PDF text-extraction capability.

use crate::Result;

/// Parses PDF bytes.
///
/// Implementations are CPU-bound and synchronous; async callers should run
/// them on a blocking thread.
pub trait PdfReader: Send + Sync {
  /// Extract the text of every page, in page order. The length of the
  /// result is the page count.
  ///
  /// Fails with [`Error::Malformed`](crate::Error::Malformed) if `bytes` is
  /// not a parseable PDF.
  fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>>;

  /// Number of pages, without keeping the text. Readers that can count
  /// pages more cheaply than extracting them should override this.
  fn page_count(&self, bytes: &[u8]) -> Result<u32> {
    Ok(self.page_texts(bytes)?.len() as u32)
  }
}
