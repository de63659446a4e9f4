//! Embedding providers for generating vector representations of text.

mod provider;

pub use provider::{EmbeddingProvider, OllamaProvider, OpenAiProvider};
