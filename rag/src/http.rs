//! Shared HTTP plumbing for the embedding and completion providers.

use std::time::Duration;

use log::warn;
use serde::Deserialize;

/// Default request timeout for model calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest slice of a response body quoted in error messages.
const MAX_BODY_IN_ERROR: usize = 500;

/// Build a client with a request timeout. The timeout is the only bound on
/// an external model call, so expiry surfaces as the caller's error.
pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!("Failed to build HTTP client with timeout, using defaults: {e}");
            reqwest::Client::new()
        })
}

pub(crate) fn trim_endpoint(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Error bodies: `{"error": {"message": ..}}` (OpenAI, Anthropic) or
/// `{"error": ".."}` (Ollama).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message { message: String },
    Text(String),
}

/// Pull a readable message out of a provider error body.
pub(crate) fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: ErrorDetail::Message { message },
        })
        | Ok(ErrorBody {
            error: ErrorDetail::Text(message),
        }) => message,
        Err(_) => truncate(body.trim(), MAX_BODY_IN_ERROR).to_string(),
    }
}

/// Truncate on a char boundary.
pub(crate) fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message_shapes() {
        assert_eq!(
            api_error_message(r#"{"error": {"message": "Invalid API key", "type": "auth"}}"#),
            "Invalid API key"
        );
        assert_eq!(
            api_error_message(r#"{"error": "model 'llama9' not found"}"#),
            "model 'llama9' not found"
        );
        assert_eq!(api_error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn test_trim_endpoint() {
        assert_eq!(trim_endpoint("http://localhost:11434/"), "http://localhost:11434");
    }
}
