//! Completion providers: given a prompt, return generated text.
//!
//! Non-streaming only. Provider error bodies are decoded into readable
//! messages and every failure surfaces as [`RagError::Generation`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RagError;
use crate::http::{DEFAULT_TIMEOUT, api_error_message, build_client, trim_endpoint};

/// Upper bound on generated tokens. SQL answers are short.
const MAX_OUTPUT_TOKENS: u32 = 1024;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, RagError>;

    fn model_name(&self) -> &str;

    /// Short provider identifier for status output.
    fn provider_name(&self) -> &'static str;
}

async fn error_for_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, RagError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RagError::Generation(format!(
        "{provider} API error ({}): {}",
        status.as_u16(),
        api_error_message(&body)
    )))
}

fn network_error(url: &str, e: reqwest::Error) -> RagError {
    if e.is_timeout() {
        RagError::Generation(format!("request to {url} timed out"))
    } else {
        RagError::Generation(format!("request to {url} failed: {e}"))
    }
}

// =============================================================================
// Ollama
// =============================================================================

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Ollama `/api/generate`.
pub struct OllamaCompletion {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaCompletion {
    pub fn new(model: String, endpoint: Option<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            endpoint: trim_endpoint(endpoint.as_deref().unwrap_or("http://localhost:11434")),
            model,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }
}

#[async_trait]
impl CompletionProvider for OllamaCompletion {
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let url = format!("{}/api/generate", self.endpoint);
        let request = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| network_error(&url, e))?;
        let response = error_for_status("Ollama", response).await?;

        let body: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("invalid Ollama response: {e}")))?;
        Ok(body.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}

// =============================================================================
// OpenAI-compatible
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    /// Null for some reasoning models.
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI `/chat/completions`, also used for compatible custom endpoints.
pub struct OpenAiCompletion {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompletion {
    pub fn new(model: String, api_key: Option<String>, endpoint: Option<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            endpoint: trim_endpoint(endpoint.as_deref().unwrap_or("https://api.openai.com/v1")),
            api_key,
            model,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Newer models take `max_completion_tokens` and reasoning models reject
    /// a temperature.
    fn token_params(&self) -> (Option<u32>, Option<u32>, Option<f32>) {
        let model = self.model.to_lowercase();
        let reasoning = model.starts_with("o1") || model.starts_with("o3") || model.contains("gpt-5");
        if reasoning {
            (None, Some(MAX_OUTPUT_TOKENS * 8), None)
        } else if model.contains("gpt-4o") {
            (None, Some(MAX_OUTPUT_TOKENS), Some(0.0))
        } else {
            (Some(MAX_OUTPUT_TOKENS), None, Some(0.0))
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let (max_tokens, max_completion_tokens, temperature) = self.token_params();
        let request = OpenAiChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            max_completion_tokens,
            temperature,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().await.map_err(|e| network_error(&url, e))?;
        let response = error_for_status("OpenAI", response).await?;

        let body: OpenAiChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("invalid OpenAI response: {e}")))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                RagError::Generation(format!("no response content from model '{}'", self.model))
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// =============================================================================
// Anthropic
// =============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic `/messages`.
pub struct AnthropicCompletion {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl AnthropicCompletion {
    pub fn new(model: String, api_key: String, endpoint: Option<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            endpoint: trim_endpoint(endpoint.as_deref().unwrap_or("https://api.anthropic.com/v1")),
            api_key,
            model,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }
}

#[async_trait]
impl CompletionProvider for AnthropicCompletion {
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let url = format!("{}/messages", self.endpoint);
        let request = AnthropicRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_OUTPUT_TOKENS,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| network_error(&url, e))?;
        let response = error_for_status("Anthropic", response).await?;

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("invalid Anthropic response: {e}")))?;
        let text: String = body.content.into_iter().filter_map(|b| b.text).collect();
        if text.is_empty() {
            return Err(RagError::Generation("no response content".to_string()));
        }
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}
