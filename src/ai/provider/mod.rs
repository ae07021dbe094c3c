//! Sampling Transport Abstraction
//!
//! Defines the `SamplingTransport` trait that executes a model call or hands a
//! request to a human reviewer. Every transport returns a `CompletionEnvelope`,
//! the loosely-typed result shape the response validator inspects.
//!
//! ## Modules
//!
//! - `openai`: OpenAI-compatible chat completions (hosted and local)
//! - `anthropic`: Anthropic messages API
//! - `registry`: provider status store and configuration-backed registry
//! - `stop_reason`: provider stop-reason normalization

mod anthropic;
mod openai;
pub mod registry;
pub mod stop_reason;

pub use anthropic::AnthropicTransport;
pub use openai::OpenAiTransport;
pub use registry::{ConfigRegistry, ProviderRegistry, ProviderStore, SharedProviderStore};
pub use stop_reason::StopReason;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::ai::cost::FeatureFlags;
use crate::sampling::SamplingRequest;
use crate::types::{
    CostTable, ProviderCapabilities, ProviderFamily, Result, Role, SamplingError,
    SamplingMessage, content_text,
};

// =============================================================================
// Completion Envelope
// =============================================================================

/// Token usage reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_tokens: Option<u32>,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens + self.thinking_tokens.unwrap_or(0)
    }

    /// Create from OpenAI-style usage response
    pub fn from_openai(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            input_tokens: prompt_tokens,
            output_tokens: completion_tokens,
            thinking_tokens: None,
        }
    }
}

/// Raw provider result as seen by the validator.
///
/// Providers can answer with HTTP success and still carry nothing usable, so
/// every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// String, `{text}` object, or array of content blocks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(alias = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl CompletionEnvelope {
    /// Successful assistant completion
    pub fn completed(
        text: impl Into<String>,
        model: impl Into<String>,
        stop_reason: Option<String>,
        usage: Option<TokenUsage>,
    ) -> Self {
        Self {
            status: Some("completed".to_string()),
            role: Some(Role::Assistant),
            content: Some(Value::String(text.into())),
            model: Some(model.into()),
            stop_reason,
            usage,
            ..Default::default()
        }
    }

    /// Error-status envelope
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some("error".to_string()),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Text extracted from `content`, falling back to `text`
    pub fn extracted_text(&self) -> String {
        let from_content = self.content.as_ref().map(content_text).unwrap_or_default();
        if from_content.trim().is_empty()
            && let Some(text) = &self.text
        {
            return text.clone();
        }
        from_content
    }

    pub fn is_error_status(&self) -> bool {
        self.status.as_deref() == Some("error")
    }
}

// =============================================================================
// Transport Contract
// =============================================================================

/// One model call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInvocation {
    pub server_id: String,
    pub messages: Vec<SamplingMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    pub features: FeatureFlags,
}

/// State of a human-in-the-loop hand-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitlStatus {
    /// Awaiting out-of-band review
    Pending,
    Completed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlOutcome {
    pub status: HitlStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<CompletionEnvelope>,
}

impl HitlOutcome {
    pub fn pending() -> Self {
        Self {
            status: HitlStatus::Pending,
            response: None,
        }
    }
}

/// Executes sampling requests against a provider or a human reviewer
#[async_trait]
pub trait SamplingTransport: Send + Sync {
    /// Call the model once. Retries are the caller's concern.
    async fn invoke_model(&self, invocation: &ModelInvocation) -> Result<CompletionEnvelope>;

    /// Hand the request to a human reviewer.
    ///
    /// Transports without a review channel leave it pending for manual
    /// resolution.
    async fn invoke_hitl(
        &self,
        _server_id: &str,
        _server_name: &str,
        _request: &SamplingRequest,
    ) -> Result<HitlOutcome> {
        Ok(HitlOutcome::pending())
    }

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// Shared transport type for concurrent request tasks.
pub type SharedTransport = Arc<dyn SamplingTransport>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for one provider
///
/// Note: API keys are never serialized and are redacted in debug output.
/// Transports convert the key to SecretString internally.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Stable identifier, referenced by `active_provider`
    pub id: String,
    /// Display name
    pub name: String,
    pub family: ProviderFamily,
    pub enabled: bool,
    /// Default model
    pub model: String,
    /// API base URL (family default when unset)
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key (family default when unset)
    pub api_key_env: Option<String>,
    pub cost: CostTable,
    pub capabilities: ProviderCapabilities,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("family", &self.family)
            .field("enabled", &self.enabled)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_env", &self.api_key_env)
            .field("cost", &self.cost)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: "openai".to_string(),
            name: "OpenAI".to_string(),
            family: ProviderFamily::OpenAi,
            enabled: true,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            api_key_env: None,
            cost: CostTable::default(),
            capabilities: ProviderCapabilities::default(),
        }
    }
}

impl ProviderConfig {
    /// API key from config, else from the configured or family env var
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .or(self.family.default_api_key_env())
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.trim().is_empty())
            })
    }

    /// Local providers need only be enabled; hosted ones also need a key
    pub fn is_configured(&self) -> bool {
        if !self.enabled {
            return false;
        }
        self.family.is_local() || self.resolve_api_key().is_some()
    }

    pub fn default_base_url(&self) -> &'static str {
        match self.family {
            ProviderFamily::OpenAi => "https://api.openai.com/v1",
            ProviderFamily::Anthropic => "https://api.anthropic.com/v1",
            ProviderFamily::Local => "http://localhost:11434/v1",
        }
    }

    pub fn effective_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.default_base_url().to_string())
    }
}

/// Validate an endpoint URL: http/https only, trailing slash removed
pub fn validate_endpoint(endpoint: &str) -> Result<String> {
    let url = url::Url::parse(endpoint).map_err(|e| {
        SamplingError::Config(format!("Invalid endpoint URL '{}': {}", endpoint, e))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SamplingError::Config(format!(
            "Endpoint must use http or https scheme, got: {}",
            url.scheme()
        )));
    }

    let mut result = url.to_string();
    if result.ends_with('/') {
        result.pop();
    }
    Ok(result)
}

/// Create a shared transport from provider configuration
pub fn create_transport(config: &ProviderConfig, timeout_secs: u64) -> Result<SharedTransport> {
    match config.family {
        ProviderFamily::OpenAi | ProviderFamily::Local => {
            Ok(Arc::new(OpenAiTransport::new(config, timeout_secs)?))
        }
        ProviderFamily::Anthropic => Ok(Arc::new(AnthropicTransport::new(config, timeout_secs)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_deserialize_partial() {
        let envelope: CompletionEnvelope = serde_json::from_value(json!({
            "content": {"type": "text", "text": "hi"},
            "stopReason": "end_turn"
        }))
        .unwrap();
        assert_eq!(envelope.extracted_text(), "hi");
        assert_eq!(envelope.stop_reason.as_deref(), Some("end_turn"));
        assert!(envelope.status.is_none());
    }

    #[test]
    fn test_envelope_text_fallback() {
        let envelope = CompletionEnvelope {
            content: Some(json!("   ")),
            text: Some("from text".to_string()),
            ..Default::default()
        };
        assert_eq!(envelope.extracted_text(), "from text");
    }

    #[test]
    fn test_completed_envelope_shape() {
        let envelope = CompletionEnvelope::completed("ok", "gpt-4o-mini", Some("stop".into()), None);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "ok");
        assert_eq!(value["stop_reason"], "stop");
    }

    #[test]
    fn test_provider_config_debug_redacts_key() {
        let config = ProviderConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_local_provider_configured_without_key() {
        let local = ProviderConfig {
            id: "ollama".to_string(),
            family: ProviderFamily::Local,
            ..Default::default()
        };
        assert!(local.is_configured());

        let disabled = ProviderConfig {
            enabled: false,
            ..local
        };
        assert!(!disabled.is_configured());
    }

    #[test]
    fn test_hosted_provider_needs_key() {
        let hosted = ProviderConfig {
            api_key_env: Some("SAMPLING_LAB_TEST_UNSET_KEY".to_string()),
            ..Default::default()
        };
        assert!(!hosted.is_configured());

        let keyed = ProviderConfig {
            api_key: Some("sk-test".to_string()),
            ..hosted
        };
        assert!(keyed.is_configured());
    }

    #[test]
    fn test_validate_endpoint() {
        assert_eq!(
            validate_endpoint("http://localhost:11434/v1/").unwrap(),
            "http://localhost:11434/v1"
        );
        assert!(validate_endpoint("file:///etc/passwd").is_err());
        assert!(validate_endpoint("not a url").is_err());
    }
}
