//! Anthropic Messages Transport
//!
//! Transport for the extended-thinking provider family. Content blocks are
//! passed through to the envelope untouched; the validator flattens them.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    CompletionEnvelope, ModelInvocation, ProviderConfig, SamplingTransport, StopReason, TokenUsage,
    validate_endpoint,
};
use crate::ai::cost::CostEstimator;
use crate::types::{MessageContent, ProviderFamily, Result, Role, SamplingError, SamplingMessage};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicTransport {
    id: String,
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicTransport")
            .field("id", &self.id)
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicTransport {
    pub fn new(config: &ProviderConfig, timeout_secs: u64) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            SamplingError::Config(format!(
                "API key not found for provider '{}'. Set {} or provide api_key in config",
                config.id,
                config
                    .api_key_env
                    .as_deref()
                    .unwrap_or("ANTHROPIC_API_KEY")
            ))
        })?;

        let api_base = validate_endpoint(&config.effective_base_url())?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SamplingError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            id: config.id.clone(),
            api_key: SecretString::from(api_key),
            api_base,
            model: config.model.clone(),
            client,
        })
    }

    fn build_request(&self, invocation: &ModelInvocation) -> MessagesRequest {
        // System-role messages move into the top-level system field
        let mut system_parts: Vec<String> = invocation
            .system_prompt
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        let mut messages = Vec::with_capacity(invocation.messages.len());

        for message in &invocation.messages {
            if message.role == Role::System {
                if let Some(text) = message.text() {
                    system_parts.push(text.to_string());
                }
                continue;
            }
            if let Some(converted) = to_anthropic_message(message) {
                messages.push(converted);
            }
        }

        // Thinking tokens count against max_tokens, and the API rejects a temperature with it
        let thinking = invocation
            .features
            .thinking
            .map(|budget| budget.budget_tokens(CostEstimator::input_tokens(&invocation.messages)));
        let temperature = invocation.temperature.filter(|_| thinking.is_none());

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: invocation.max_tokens.saturating_add(thinking.unwrap_or(0)),
            messages,
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
            temperature,
            thinking: thinking.map(|budget_tokens| ThinkingConfig {
                kind: "enabled",
                budget_tokens,
            }),
            stop_sequences: (!invocation.stop_sequences.is_empty())
                .then(|| invocation.stop_sequences.clone()),
        }
    }
}

fn to_anthropic_message(message: &SamplingMessage) -> Option<AnthropicMessage> {
    let content = match &message.content {
        MessageContent::Text { text } => json!([{"type": "text", "text": text}]),
        MessageContent::Image { data, mime_type } => json!([{
            "type": "image",
            "source": {"type": "base64", "media_type": mime_type, "data": data}
        }]),
        MessageContent::Audio { .. } => {
            warn!("Audio content is not supported by the messages API, skipping message");
            return None;
        }
    };
    Some(AnthropicMessage {
        role: message.role.to_string(),
        content,
    })
}

#[async_trait]
impl SamplingTransport for AnthropicTransport {
    async fn invoke_model(&self, invocation: &ModelInvocation) -> Result<CompletionEnvelope> {
        info!(
            provider = %self.id,
            model = %self.model,
            max_tokens = invocation.max_tokens,
            "Invoking messages API"
        );

        let start_time = Instant::now();
        let request = self.build_request(invocation);
        let url = format!("{}/messages", self.api_base);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| SamplingError::provider(&self.id, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SamplingError::provider(
                &self.id,
                format!("API error ({}): {}", status, body),
            ));
        }

        let body: MessagesResponse = response.json().await.map_err(|e| {
            SamplingError::provider(&self.id, format!("Failed to parse response: {}", e))
        })?;

        debug!(
            provider = %self.id,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Messages response received"
        );

        let stop_reason = body.stop_reason.as_deref().map(|r| {
            StopReason::from_provider(ProviderFamily::Anthropic, r)
                .as_str()
                .to_string()
        });
        let usage = body.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
            thinking_tokens: None,
        });
        // Thinking blocks carry no user-facing text
        let blocks: Vec<Value> = body
            .content
            .into_iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .collect();

        Ok(CompletionEnvelope {
            status: Some("completed".to_string()),
            role: Some(Role::Assistant),
            content: Some(Value::Array(blocks)),
            model: Some(body.model.unwrap_or_else(|| self.model.clone())),
            stop_reason,
            usage,
            ..Default::default()
        })
    }

    fn name(&self) -> &str {
        &self.id
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
