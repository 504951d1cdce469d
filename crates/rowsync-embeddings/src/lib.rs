//! Embedding providers for Rowsync.
//!
//! - [`FakeEmbeddings`]: deterministic vectors derived from the text bytes,
//!   for tests and demos.
//! - [`HttpEmbeddings`]: a client for an embedding service that accepts
//!   `{"texts": [...], "model": "..."}` and answers
//!   `{"embeddings": [[...], ...]}`.

mod fake;
mod http;

pub use fake::FakeEmbeddings;
pub use http::{HttpEmbeddings, HttpEmbeddingsConfig};

pub use rowsync_core::Embeddings;
