//! LLM Provider Abstraction Layer
//!
//! This module provides a common interface for the model providers behind the
//! AI capability: Ollama for the local `edge` tier and Gemini for the `flash`
//! and `pro` tiers. The LLMProvider trait defines the contract all providers
//! implement; the [`router::ModelRouter`] dispatches requests by tier and
//! turns raw completions into thoughts, text and structured values.

use async_trait::async_trait;
use sdk::errors::AiError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub mod gemini;
pub mod ollama;
pub mod router;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use router::ModelRouter;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Blocked by safety filter: {0}")]
    SafetyBlocked(String),

    #[error("Token limit reached: {0}")]
    TokenLimit(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<LLMError> for AiError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::ProviderUnavailable(message) | LLMError::NetworkError(message) => {
                AiError::Network(message)
            }
            LLMError::AuthenticationFailed(message) => AiError::Auth(message),
            LLMError::RateLimitExceeded => AiError::RateLimited,
            LLMError::InvalidRequest(message) => AiError::BadRequest(message),
            LLMError::ServerError { status, message } => AiError::Server { status, message },
            LLMError::Timeout => AiError::Timeout,
            LLMError::ParseError(message) => AiError::Schema(message),
            LLMError::SafetyBlocked(message) => AiError::Safety(message),
            LLMError::TokenLimit(message) => AiError::TokenLimit(message),
            LLMError::Unknown(message) => AiError::Other(message),
        }
    }
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Per-request generation options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    /// Ask the provider to emit a JSON document
    pub json: bool,

    /// Sampling temperature, provider default when unset
    pub temperature: Option<f64>,
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "gemini")
    fn name(&self) -> &str;

    /// Returns true if this is a local provider (e.g., Ollama), false for cloud providers
    fn is_local(&self) -> bool;

    /// Returns the estimated cost in USD for the given number of tokens
    /// Local providers should return 0.0
    fn estimated_cost(&self, tokens: usize) -> f64;

    /// Generate a completion for the conversation
    ///
    /// # Returns
    /// * `Ok(String)` - The raw text of the completion
    /// * `Err(LLMError)` - If the request fails
    async fn complete(&self, messages: &[Message], options: &CompletionOptions) -> Result<String>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Extract a JSON document from model output.
///
/// Handles multiple output formats:
/// 1. Raw JSON (entire content parses)
/// 2. Fenced JSON (with or without trailing text): ` ```json\n{...}\n``` `
/// 3. JSON embedded in prose: the first balanced `{...}` or `[...]`
pub fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(inner.trim()) {
            return Some(value);
        }
    }

    // Outermost bracket first, so an array of objects is not cut down to its first item
    let mut starts: Vec<usize> = ['{', '[']
        .iter()
        .filter_map(|open| trimmed.find(*open))
        .collect();
    starts.sort_unstable();

    starts.into_iter().find_map(|pos| {
        extract_balanced_json(&trimmed[pos..])
            .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
    })
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object or array starting at position 0 of `s`.
///
/// Counts bracket depth, respecting string literals, to find the matching
/// close bracket.
fn extract_balanced_json(s: &str) -> Option<&str> {
    let (open, close) = match s.chars().next()? {
        '{' => ('{', '}'),
        '[' => ('[', ']'),
        _ => return None,
    };
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let system_msg = Message::system("You are a storyteller");
        assert_eq!(system_msg.role, MessageRole::System);
        assert_eq!(Message::assistant("Hi").role.to_string(), "assistant");
    }

    #[test]
    fn test_extract_raw_json() {
        assert_eq!(extract_json(r#"{"reply": "hi"}"#), Some(json!({"reply": "hi"})));
    }

    #[test]
    fn test_extract_fenced_json_with_trailing_text() {
        let content = "Here you go:\n```json\n{\"approved\": true}\n```\nSleep well!";
        assert_eq!(extract_json(content), Some(json!({"approved": true})));
    }

    #[test]
    fn test_extract_embedded_json() {
        let content = r#"Sure! {"fact": "likes {curly} braces", "n": 1} hope that helps"#;
        assert_eq!(
            extract_json(content),
            Some(json!({"fact": "likes {curly} braces", "n": 1}))
        );

        let array = r#"Facts: [{"fact": "a"}] done"#;
        assert_eq!(extract_json(array), Some(json!([{"fact": "a"}])));
    }

    #[test]
    fn test_extract_json_no_match() {
        assert_eq!(extract_json("Once upon a time"), None);
    }

    #[test]
    fn test_llm_error_maps_onto_ai_error() {
        assert!(matches!(AiError::from(LLMError::Timeout), AiError::Timeout));
        assert!(matches!(
            AiError::from(LLMError::SafetyBlocked("SAFETY".to_string())),
            AiError::Safety(_)
        ));
        assert!(matches!(
            AiError::from(LLMError::ServerError {
                status: 503,
                message: "busy".to_string()
            }),
            AiError::Server { status: 503, .. }
        ));
        assert!(matches!(
            AiError::from(LLMError::ParseError("bad".to_string())),
            AiError::Schema(_)
        ));
    }
}
