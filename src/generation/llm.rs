//! Chat-completions client for OpenAI-compatible providers (OpenRouter by default)
//!
//! `LlmGenerator` adapts the client to the [`TextGenerator`] port, routing
//! each generation role to its configured model.

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{extract_json, truncate, GenerationRole, Prompt, TextGenerator};
use crate::config::{GenerationConfig, ModelsConfig};
use crate::error::{Error, Result};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

// ============ Provider Configuration ============

/// Configuration for an LLM API provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL for the API (e.g., "https://openrouter.ai/api/v1")
    pub base_url: String,
    /// API key for authentication
    pub api_key: String,
    /// Extra headers to include in requests (e.g., X-Title, HTTP-Referer)
    pub extra_headers: Vec<(String, String)>,
}

impl ProviderConfig {
    /// OpenRouter provider configuration
    pub fn openrouter(api_key: String) -> Self {
        Self {
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key,
            extra_headers: vec![("X-Title".to_string(), "Adaptive Learner".to_string())],
        }
    }

    /// Any OpenAI-compatible endpoint
    pub fn with_url(api_key: String, base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            extra_headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
}

/// Chat-completions API client
#[derive(Clone)]
pub struct ChatClient {
    client: Arc<Client>,
    provider: ProviderConfig,
}

impl ChatClient {
    pub fn with_provider(provider: ProviderConfig) -> Self {
        Self {
            client: Arc::new(Client::new()),
            provider,
        }
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Send a chat completion request and return the assistant text
    pub async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: Option<u32>,
    ) -> anyhow::Result<String> {
        let request = ChatRequest {
            model,
            messages,
            max_tokens,
            temperature: 0.0,
        };

        let mut req_builder = self.client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .header("Authorization", format!("Bearer {}", self.provider.api_key));
        for (key, value) in &self.provider.extra_headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }
        let response = req_builder
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("LLM API error ({}): {}", status, truncate(&body, 500));
        }

        let body = response.text().await.context("Failed to read response body")?;
        debug!("LLM response: {}", truncate(&body, 2000));

        let raw_response: Value = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse JSON response (body: {})", truncate(&body, 500)))?;

        Ok(message_text(&raw_response))
    }
}

/// Assistant text from a completion response.
///
/// Some providers return content as a string, others as an array of
/// `{"type": "text", "text": ...}` parts.
fn message_text(response: &Value) -> String {
    let content = response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"));

    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| {
                if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                    part.get("text").and_then(|t| t.as_str()).map(|s| s.to_string())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

/// [`TextGenerator`] backed by a chat-completions provider
pub struct LlmGenerator {
    client: ChatClient,
    models: ModelsConfig,
    max_tokens: u32,
}

impl LlmGenerator {
    pub fn new(client: ChatClient, models: ModelsConfig, generation: &GenerationConfig) -> Self {
        Self {
            client,
            models,
            max_tokens: generation.max_tokens,
        }
    }

    /// Build from configuration, resolving the API key from env / keyring
    pub fn from_config(config: &crate::config::Config) -> anyhow::Result<Self> {
        let api_key = crate::security::keyring::get_api_key()?;
        let provider = if config.generation.base_url == OPENROUTER_BASE_URL {
            ProviderConfig::openrouter(api_key)
        } else {
            ProviderConfig::with_url(api_key, config.generation.base_url.clone())
        };
        Ok(Self::new(
            ChatClient::with_provider(provider),
            config.models.clone(),
            &config.generation,
        ))
    }

    pub fn model_for(&self, role: GenerationRole) -> &str {
        match role {
            GenerationRole::Profiler => &self.models.profiler,
            GenerationRole::Scheduler => &self.models.scheduler,
            GenerationRole::Simulator => &self.models.simulator,
        }
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    async fn generate(&self, prompt: &Prompt, schema: &str) -> Result<Value> {
        let model = self.model_for(prompt.role);
        let messages = [
            ChatMessage::system(&prompt.system),
            ChatMessage::user(format!(
                "{}\n\nRespond with JSON only, following this format:\n{}",
                prompt.task, schema
            )),
        ];

        debug!("Generating with {} ({})", model, prompt.role);
        let text = self.client
            .complete(model, &messages, Some(self.max_tokens))
            .await
            .map_err(|e| Error::Generation(format!("{:#}", e)))?;

        extract_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_text_string() {
        let resp = json!({"choices": [{"message": {"content": "{\"a\":1}"}}]});
        assert_eq!(message_text(&resp), "{\"a\":1}");
    }

    #[test]
    fn test_message_text_parts() {
        let resp = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "Hello "},
            {"type": "image_url", "image_url": {"url": "x"}},
            {"type": "text", "text": "world"}
        ]}}]});
        assert_eq!(message_text(&resp), "Hello world");
    }

    #[test]
    fn test_message_text_missing() {
        assert_eq!(message_text(&json!({"choices": []})), "");
    }

    #[test]
    fn test_model_routing() {
        let generator = LlmGenerator::new(
            ChatClient::with_provider(ProviderConfig::openrouter("k".to_string())),
            ModelsConfig::default(),
            &GenerationConfig::default(),
        );
        assert_eq!(
            generator.model_for(GenerationRole::Simulator),
            ModelsConfig::default().simulator
        );
    }

    #[test]
    fn test_custom_url_trimmed() {
        let p = ProviderConfig::with_url("k".into(), "http://localhost:8080/v1/".into());
        assert_eq!(p.base_url, "http://localhost:8080/v1");
    }
}
