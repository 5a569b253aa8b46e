//! Production implementations of the RAGBot collaborator traits.
//!
//! | Capability | Implementation |
//! |------------|----------------|
//! | [`BlobStore`](ragbot_core::blob::BlobStore) | [`FsBlobStore`] |
//! | [`JobQueue`](ragbot_core::queue::JobQueue) | [`ChannelQueue`] |
//! | [`PdfReader`](ragbot_core::pdf::PdfReader) | [`LopdfReader`] |
//! | [`Embedder`](ragbot_core::embed::Embedder) | [`OpenAiEmbedder`] |
//! | [`CompletionModel`](ragbot_core::llm::CompletionModel) | [`OpenAiChat`] |

pub mod fs_blob;
pub mod openai;
pub mod pdf;
pub mod queue;

pub use fs_blob::FsBlobStore;
pub use openai::{OpenAiChat, OpenAiEmbedder, OpenAiSettings};
pub use pdf::LopdfReader;
pub use queue::ChannelQueue;
