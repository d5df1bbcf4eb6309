//! # antbox-inference
//!
//! Model backends implementing the [`antbox_core::EmbeddingModel`] and
//! [`antbox_core::OcrModel`] traits: an Ollama HTTP backend for
//! production use and deterministic mocks for tests.
//!
//! The semantic plane is optional everywhere; when no backend is
//! configured, search degrades to fulltext fall-through.

pub mod mock;
pub mod ollama;

pub use mock::{MockEmbedding, MockOcr};
pub use ollama::OllamaEmbedding;
