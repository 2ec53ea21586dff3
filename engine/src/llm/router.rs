//! Model Router
//!
//! Dispatches each request to the provider serving its [`ModelTier`] and turns
//! raw completions into the shapes the AI capability promises. The router
//! never retries or falls back on its own; failures go back to the caller so
//! the resilience layer can decide what happens next.

use async_trait::async_trait;
use sdk::capability::{AiCapability, PromptRequest};
use sdk::errors::AiError;
use sdk::types::{ModelTier, Thought};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{extract_json, CompletionOptions, GeminiProvider, LLMProvider, Message, OllamaProvider};
use crate::config::{LLMConfig, ResilienceConfig};

const STRICT_JSON_INSTRUCTION: &str =
    "Respond with a single JSON document only. No markdown fences, no commentary.";

/// Tier-keyed set of providers implementing [`AiCapability`]
pub struct ModelRouter {
    flash: Arc<dyn LLMProvider>,
    pro: Arc<dyn LLMProvider>,
    edge: Arc<dyn LLMProvider>,
}

impl ModelRouter {
    pub fn new(
        flash: Arc<dyn LLMProvider>,
        pro: Arc<dyn LLMProvider>,
        edge: Arc<dyn LLMProvider>,
    ) -> Self {
        Self { flash, pro, edge }
    }

    /// Build the router from configuration: Gemini for flash/pro, Ollama for edge
    pub fn from_config(llm: &LLMConfig, resilience: &ResilienceConfig) -> Self {
        let timeout = Duration::from_secs(llm.request_timeout_secs);

        let flash = GeminiProvider::new(
            &llm.gemini,
            llm.gemini.flash_model.clone(),
            resilience.flash_cost_usd,
            timeout,
        );
        let pro = GeminiProvider::new(
            &llm.gemini,
            llm.gemini.pro_model.clone(),
            resilience.pro_cost_usd,
            timeout,
        );
        let edge = OllamaProvider::new(llm.ollama.base_url.clone(), llm.ollama.model.clone(), timeout);

        Self::new(Arc::new(flash), Arc::new(pro), Arc::new(edge))
    }

    /// Provider serving `tier`
    pub fn provider(&self, tier: ModelTier) -> &dyn LLMProvider {
        match tier {
            ModelTier::Flash => self.flash.as_ref(),
            ModelTier::Pro => self.pro.as_ref(),
            ModelTier::Edge => self.edge.as_ref(),
        }
    }

    /// Check the health of every tier
    /// Returns a list of (tier, provider_name, is_healthy)
    pub async fn check_health(&self) -> Vec<(ModelTier, String, bool)> {
        let mut results = Vec::new();
        for tier in [ModelTier::Flash, ModelTier::Pro, ModelTier::Edge] {
            let provider = self.provider(tier);
            results.push((tier, provider.name().to_string(), provider.check_health().await));
        }
        results
    }

    fn options(request: &PromptRequest, json: bool) -> CompletionOptions {
        let strict = request.flag("strictSchema");
        let temperature = request
            .parameters
            .get("temperature")
            .and_then(Value::as_f64)
            .or(if strict { Some(0.0) } else { None });

        CompletionOptions { json, temperature }
    }

    fn messages(request: &PromptRequest, extra_system: Option<String>) -> Vec<Message> {
        let mut system = request.system_prompt.clone();
        if let Some(extra) = extra_system {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str(&extra);
        }

        let mut messages = Vec::with_capacity(2);
        if !system.trim().is_empty() {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(request.user_prompt.clone()));
        messages
    }

    async fn complete(
        &self,
        request: &PromptRequest,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<String, AiError> {
        let provider = self.provider(request.tier);

        tracing::debug!(
            tier = request.tier.as_str(),
            provider = provider.name(),
            json = options.json,
            "Dispatching model call"
        );

        provider.complete(messages, options).await.map_err(|e| {
            tracing::warn!("Provider {} failed: {}", provider.name(), e);
            AiError::from(e)
        })
    }
}

#[async_trait]
impl AiCapability for ModelRouter {
    async fn generate_thought(&self, request: &PromptRequest) -> Result<Thought, AiError> {
        let extra = request
            .flag("strictSchema")
            .then(|| STRICT_JSON_INSTRUCTION.to_string());
        let messages = Self::messages(request, extra);
        let raw = self
            .complete(request, &messages, &Self::options(request, true))
            .await?;

        let value = extract_json(&raw)
            .ok_or_else(|| AiError::Schema("Model output contained no JSON".to_string()))?;

        serde_json::from_value(value)
            .map_err(|e| AiError::Schema(format!("Thought did not match the expected shape: {}", e)))
    }

    async fn generate_text(&self, request: &PromptRequest) -> Result<String, AiError> {
        let messages = Self::messages(request, None);
        let raw = self
            .complete(request, &messages, &Self::options(request, false))
            .await?;

        Ok(raw.trim().to_string())
    }

    async fn generate_structured(
        &self,
        schema: &Value,
        request: &PromptRequest,
    ) -> Result<Value, AiError> {
        let schema_text = serde_json::to_string_pretty(schema)
            .map_err(|e| AiError::Other(format!("Unprintable schema: {}", e)))?;
        let mut extra = format!("Output must be JSON matching this schema:\n{}", schema_text);
        if request.flag("strictSchema") {
            extra.push('\n');
            extra.push_str(STRICT_JSON_INSTRUCTION);
        }

        let messages = Self::messages(request, Some(extra));
        let raw = self
            .complete(request, &messages, &Self::options(request, true))
            .await?;

        extract_json(&raw).ok_or_else(|| AiError::Schema("Model output contained no JSON".to_string()))
    }
}
