//! Embedding provider trait and implementations.
//!
//! Supports OpenAI-compatible and Ollama embedding APIs. Every vector is
//! checked against the configured dimensionality so a model swap cannot
//! silently mix incompatible vectors into one index.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RagError;
use crate::http::{DEFAULT_TIMEOUT, api_error_message, build_client, trim_endpoint};

/// Trait for embedding providers that convert text to vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Generate embeddings for a batch of texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Return the dimensionality of embeddings produced.
    fn dimensions(&self) -> usize;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Check a provider response: one vector per input, each of `dims` floats.
fn check_vectors(
    vectors: Vec<Vec<f32>>,
    expected: usize,
    dims: usize,
) -> Result<Vec<Vec<f32>>, RagError> {
    if vectors.len() != expected {
        return Err(RagError::Embedding(format!(
            "expected {expected} embeddings, got {}",
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(RagError::Embedding(format!(
            "expected {dims}-dimensional embeddings, got {}",
            bad.len()
        )));
    }
    Ok(vectors)
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI embedding provider.
///
/// Works with OpenAI's API and any compatible endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "text-embedding-3-small")
    /// * `endpoint` - API endpoint (defaults to "https://api.openai.com/v1")
    /// * `dims` - Embedding dimensions (1536 for text-embedding-3-small)
    pub fn new(
        api_key: String,
        model: String,
        endpoint: Option<String>,
        dims: Option<usize>,
    ) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            endpoint: trim_endpoint(endpoint.as_deref().unwrap_or("https://api.openai.com/v1")),
            api_key,
            model,
            dims: dims.unwrap_or(1536),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Empty response from OpenAI".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.endpoint);
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "OpenAI API error {status}: {}",
                api_error_message(&body)
            )));
        }

        let mut result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("invalid OpenAI response: {e}")))?;
        result.data.sort_by_key(|d| d.index);
        let vectors = result.data.into_iter().map(|d| d.embedding).collect();
        check_vectors(vectors, texts.len(), self.dims)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Ollama embedding provider, using the local `/api/embed` endpoint.
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: usize,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaProvider {
    /// Create a new Ollama provider.
    ///
    /// # Arguments
    /// * `model` - Model name (e.g., "nomic-embed-text")
    /// * `endpoint` - Ollama endpoint (defaults to "http://localhost:11434")
    /// * `dims` - Embedding dimensions (768 for nomic-embed-text)
    pub fn new(model: String, endpoint: Option<String>, dims: Option<usize>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            endpoint: trim_endpoint(endpoint.as_deref().unwrap_or("http://localhost:11434")),
            model,
            dims: dims.unwrap_or(768),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Empty response from Ollama".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/embed", self.endpoint);
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "Ollama API error {status}: {}",
                api_error_message(&body)
            )));
        }

        let result: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("invalid Ollama response: {e}")))?;
        check_vectors(result.embeddings, texts.len(), self.dims)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_provider_creation() {
        let provider = OpenAiProvider::new(
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            None,
            None,
        );
        assert_eq!(provider.dimensions(), 1536);
        assert_eq!(provider.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn test_ollama_provider_defaults() {
        let provider = OllamaProvider::new("nomic-embed-text".to_string(), None, None);
        assert_eq!(provider.dimensions(), 768);
        assert_eq!(provider.endpoint, "http://localhost:11434");
    }

    #[test]
    fn test_custom_endpoint_is_trimmed() {
        let provider = OpenAiProvider::new(
            "key".to_string(),
            "custom-model".to_string(),
            Some("http://custom:8080/v1/".to_string()),
            Some(384),
        );
        assert_eq!(provider.dimensions(), 384);
        assert_eq!(provider.endpoint, "http://custom:8080/v1");
    }

    #[test]
    fn test_check_vectors() {
        assert!(check_vectors(vec![vec![0.0; 3]], 1, 3).is_ok());
        assert!(matches!(
            check_vectors(vec![vec![0.0; 2]], 1, 3),
            Err(RagError::Embedding(_))
        ));
        assert!(matches!(
            check_vectors(vec![], 1, 3),
            Err(RagError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_embedding_error() {
        let provider = OllamaProvider::new(
            "nomic-embed-text".to_string(),
            Some("http://127.0.0.1:9".to_string()),
            None,
        )
        .with_timeout(Duration::from_secs(2));
        let err = provider.embed("orders").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }
}
