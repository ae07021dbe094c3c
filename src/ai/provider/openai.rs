//! OpenAI-compatible Transport
//!
//! Chat Completions transport used for the hosted OpenAI family and for local
//! OpenAI-compatible servers (Ollama, LM Studio). Returns the raw completion as
//! a `CompletionEnvelope`; empty completions are left for the validator.

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
use crate::ai::cost::ReasoningEffort;
use crate::types::{MessageContent, ProviderFamily, Result, SamplingError, SamplingMessage};

/// OpenAI-compatible transport with secure API key handling
pub struct OpenAiTransport {
    id: String,
    family: ProviderFamily,
    /// Never exposed in logs or debug output; local servers run without one
    api_key: Option<SecretString>,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiTransport")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiTransport {
    pub fn new(config: &ProviderConfig, timeout_secs: u64) -> Result<Self> {
        let api_key = config.resolve_api_key();
        if api_key.is_none() && !config.family.is_local() {
            return Err(SamplingError::Config(format!(
                "API key not found for provider '{}'. Set {} or provide api_key in config",
                config.id,
                config
                    .api_key_env
                    .as_deref()
                    .or(config.family.default_api_key_env())
                    .unwrap_or("an API key env var")
            )));
        }

        let api_base = validate_endpoint(&config.effective_base_url())?;
        if config.family.is_local()
            && let Ok(url) = url::Url::parse(&api_base)
            && let Some(host) = url.host_str()
            && !matches!(host, "localhost" | "127.0.0.1" | "::1")
        {
            warn!(
                "Local provider endpoint is not localhost: {}. Ensure this is intentional.",
                host
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SamplingError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            id: config.id.clone(),
            family: config.family,
            api_key: api_key.map(SecretString::from),
            api_base,
            model: config.model.clone(),
            client,
        })
    }

    fn build_request(&self, invocation: &ModelInvocation) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(invocation.messages.len() + 1);
        if let Some(system) = invocation.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Value::String(system.to_string()),
            });
        }
        messages.extend(invocation.messages.iter().filter_map(to_chat_message));

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: invocation.max_tokens,
            temperature: invocation.temperature,
            stop: (!invocation.stop_sequences.is_empty())
                .then(|| invocation.stop_sequences.clone()),
            reasoning_effort: self.reasoning_effort(invocation),
        }
    }

    /// Only the hosted family accepts `reasoning_effort`; minimal is the model default
    fn reasoning_effort(&self, invocation: &ModelInvocation) -> Option<ReasoningEffort> {
        let effort = invocation.features.reasoning_effort;
        (self.family == ProviderFamily::OpenAi && effort != ReasoningEffort::Minimal)
            .then_some(effort)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(
                "Authorization",
                format!("Bearer {}", key.expose_secret()),
            ),
            None => request,
        }
    }
}

fn to_chat_message(message: &SamplingMessage) -> Option<ChatMessage> {
    let content = match &message.content {
        MessageContent::Text { text } => Value::String(text.clone()),
        MessageContent::Image { data, mime_type } => json!([{
            "type": "image_url",
            "image_url": {"url": format!("data:{};base64,{}", mime_type, data)}
        }]),
        MessageContent::Audio { .. } => {
            warn!("Audio content is not supported by chat completions, skipping message");
            return None;
        }
    };
    Some(ChatMessage {
        role: message.role.to_string(),
        content,
    })
}

#[async_trait]
impl SamplingTransport for OpenAiTransport {
    async fn invoke_model(&self, invocation: &ModelInvocation) -> Result<CompletionEnvelope> {
        info!(
            provider = %self.id,
            model = %self.model,
            max_tokens = invocation.max_tokens,
            "Invoking chat completion"
        );

        let start_time = Instant::now();
        let request = self.build_request(invocation);
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() && self.family.is_local() {
                    SamplingError::provider(
                        &self.id,
                        format!(
                            "Failed to connect to {}. Is the local server running?",
                            self.api_base
                        ),
                    )
                } else {
                    SamplingError::provider(&self.id, format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SamplingError::provider(
                &self.id,
                format!("API error ({}): {}", status, body),
            ));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            SamplingError::provider(&self.id, format!("Failed to parse response: {}", e))
        })?;

        debug!(
            provider = %self.id,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Chat completion received"
        );

        let usage = body
            .usage
            .map(|u| TokenUsage::from_openai(u.prompt_tokens, u.completion_tokens));
        let choice = body.choices.into_iter().next();
        let stop_reason = choice
            .as_ref()
            .and_then(|c| c.finish_reason.as_deref())
            .map(|r| StopReason::from_provider(self.family, r).as_str().to_string());
        let content = choice.and_then(|c| c.message.content);

        Ok(CompletionEnvelope {
            status: Some("completed".to_string()),
            role: Some(crate::types::Role::Assistant),
            content: content.map(Value::String),
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
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}
