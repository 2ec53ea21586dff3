//! Gemini LLM Provider
//!
//! Serves the `flash` and `pro` tiers, one provider instance per model. The API
//! key is read from the configured environment variable on every request so a
//! rotated key is picked up without a restart.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::{CompletionOptions, LLMError, LLMProvider, Message, MessageRole};
use crate::config::GeminiConfig;

pub struct GeminiProvider {
    base_url: String,
    model: String,
    api_key_env: String,
    cost_per_1k_tokens: f64,
    client: Client,
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig, model: impl Into<String>, cost_per_1k_tokens: f64, timeout: Duration) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key_env: config.api_key_env.clone(),
            cost_per_1k_tokens,
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn api_key(&self) -> super::Result<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                LLMError::AuthenticationFailed(format!("{} is not set", self.api_key_env))
            })
    }

    fn build_payload(&self, messages: &[Message], options: &CompletionOptions) -> serde_json::Value {
        let mut contents = Vec::new();
        let mut system_parts = Vec::new();

        for msg in messages {
            if msg.role == MessageRole::System {
                system_parts.push(json!({"text": msg.content}));
                continue;
            }

            contents.push(json!({
                "role": if msg.role == MessageRole::Assistant { "model" } else { "user" },
                "parts": [{"text": msg.content}]
            }));
        }

        let mut payload = serde_json::Map::new();
        payload.insert("contents".to_string(), json!(contents));

        if !system_parts.is_empty() {
            payload.insert("systemInstruction".to_string(), json!({ "parts": system_parts }));
        }

        let mut generation_config = serde_json::Map::new();
        if options.json {
            generation_config.insert("responseMimeType".to_string(), json!("application/json"));
        }
        if let Some(temperature) = options.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if !generation_config.is_empty() {
            payload.insert("generationConfig".to_string(), json!(generation_config));
        }

        serde_json::Value::Object(payload)
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_local(&self) -> bool {
        false
    }

    fn estimated_cost(&self, tokens: usize) -> f64 {
        (tokens as f64 / 1000.0) * self.cost_per_1k_tokens
    }

    async fn check_health(&self) -> bool {
        self.api_key().is_ok()
    }

    async fn complete(&self, messages: &[Message], options: &CompletionOptions) -> super::Result<String> {
        let api_key = self.api_key()?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = self.build_payload(messages, options);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();

            return Err(match status {
                400 | 404 => LLMError::InvalidRequest(text),
                429 => LLMError::RateLimitExceeded,
                401 | 403 => LLMError::AuthenticationFailed(text),
                _ => LLMError::ServerError {
                    status,
                    message: format!("Gemini API error: {}", text),
                },
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        if let Some(reason) = data
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
        {
            return Err(LLMError::SafetyBlocked(format!("Prompt blocked: {}", reason)));
        }

        let candidate = data
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| LLMError::ParseError("No candidates in response".to_string()))?;

        match candidate.get("finishReason").and_then(|r| r.as_str()) {
            Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") => {
                return Err(LLMError::SafetyBlocked(
                    "Response blocked by safety filter".to_string(),
                ));
            }
            Some("MAX_TOKENS") => {
                return Err(LLMError::TokenLimit(
                    "Response truncated at the output token limit".to_string(),
                ));
            }
            _ => {}
        }

        let parts = candidate
            .pointer("/content/parts")
            .and_then(|p| p.as_array())
            .ok_or_else(|| LLMError::ParseError("No parts in candidate content".to_string()))?;

        let mut full_text = String::new();
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                full_text.push_str(text);
            }
        }

        Ok(full_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(
            &GeminiConfig::default(),
            "gemini-1.5-flash",
            0.5,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_payload_splits_system_instruction() {
        let payload = provider().build_payload(
            &[
                Message::system("Be gentle"),
                Message::user("Hello"),
                Message::assistant("Hi"),
            ],
            &CompletionOptions {
                json: true,
                temperature: Some(0.0),
            },
        );

        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "Be gentle");
        assert_eq!(payload["contents"][0]["role"], "user");
        assert_eq!(payload["contents"][1]["role"], "model");
        assert_eq!(payload["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(payload["generationConfig"]["temperature"], 0.0);
    }

    #[test]
    fn test_plain_text_payload_has_no_generation_config() {
        let payload = provider().build_payload(&[Message::user("Hello")], &CompletionOptions::default());
        assert!(payload.get("generationConfig").is_none());
        assert!(payload.get("systemInstruction").is_none());
    }

    #[test]
    fn test_cost_scales_with_tokens() {
        assert_eq!(provider().estimated_cost(2000), 1.0);
    }
}
