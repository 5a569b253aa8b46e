//! PDF text extraction backed by `lopdf`.

use lopdf::Document;
use ragbot_core::{Error, Result, pdf::PdfReader};
use tracing::debug;

/// Extracts text page by page. A page whose content cannot be decoded
/// (unsupported font encoding, broken content stream) yields empty text so
/// one bad page does not sink the whole document.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfReader;

impl LopdfReader {
  fn load(bytes: &[u8]) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| Error::Malformed(format!("unreadable PDF: {e}")))
  }
}

impl PdfReader for LopdfReader {
  fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>> {
    let doc = Self::load(bytes)?;
    let texts = doc
      .get_pages()
      .into_keys()
      .map(|page| match doc.extract_text(&[page]) {
        Ok(text) => text,
        Err(e) => {
          debug!(page, error = %e, "page text not extractable");
          String::new()
        }
      })
      .collect();
    Ok(texts)
  }

  fn page_count(&self, bytes: &[u8]) -> Result<u32> {
    Ok(Self::load(bytes)?.get_pages().len() as u32)
  }
}
