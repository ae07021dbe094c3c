//! Sampling request and draft types
//!
//! Serialized in camelCase. Every optional field defaults on deserialize so a
//! partially written snapshot still loads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::RequestStatus;
use crate::ai::cost::FeatureFlags;
use crate::ai::provider::{CompletionEnvelope, ModelInvocation, TokenUsage};
use crate::constants::sampling as sampling_constants;
use crate::types::{
    ContextInclusion, ModelPreferences, RequestId, SamplingMessage, truncate_preview,
};

/// Path an approved request took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPath {
    /// Model call through the transport
    Ai,
    /// Handed to a human reviewer
    Hitl,
}

impl std::fmt::Display for DispatchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ai => write!(f, "ai"),
            Self::Hitl => write!(f, "hitl"),
        }
    }
}

// =============================================================================
// Draft
// =============================================================================

/// User-composed request that has not been submitted yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingDraft {
    pub server_id: String,
    pub server_name: String,
    pub messages: Vec<SamplingMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub include_context: ContextInclusion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    pub features: FeatureFlags,
}

impl SamplingDraft {
    /// Single user message addressed to `server_id`
    pub fn text(server_id: impl Into<String>, text: impl Into<String>) -> Self {
        let server_id = server_id.into();
        Self {
            server_name: server_id.clone(),
            server_id,
            messages: vec![SamplingMessage::user(text)],
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// True when no message carries any text or media
    pub fn is_empty(&self) -> bool {
        self.messages
            .iter()
            .all(|m| m.text().is_some_and(|t| t.trim().is_empty()))
    }
}

// =============================================================================
// Request
// =============================================================================

/// A submitted request. Created on submit, mutated in place by the lifecycle
/// manager, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingRequest {
    pub id: RequestId,
    pub server_id: String,
    pub server_name: String,
    pub messages: Vec<SamplingMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub include_context: ContextInclusion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    pub features: FeatureFlags,
    pub created_at: DateTime<Utc>,
    pub status: RequestStatus,

    /// Set iff status is completed or error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<CompletionEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds from approval to resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Actual cost, only from provider-reported usage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchPath>,
}

impl Default for SamplingRequest {
    fn default() -> Self {
        Self {
            id: RequestId::generate(),
            server_id: String::new(),
            server_name: String::new(),
            messages: Vec::new(),
            model_preferences: None,
            system_prompt: None,
            include_context: ContextInclusion::default(),
            max_tokens: None,
            temperature: None,
            stop_sequences: Vec::new(),
            features: FeatureFlags::default(),
            created_at: Utc::now(),
            status: RequestStatus::Pending,
            response: None,
            error: None,
            duration: None,
            cost: None,
            estimated_cost: None,
            provider_id: None,
            model: None,
            stop_reason: None,
            usage: None,
            dispatch: None,
        }
    }
}

impl SamplingRequest {
    /// New pending request from a draft; preference weights are clamped
    pub fn from_draft(draft: SamplingDraft, estimated_cost: f64, provider_id: &str) -> Self {
        Self {
            server_id: draft.server_id,
            server_name: draft.server_name,
            messages: draft.messages,
            model_preferences: draft.model_preferences.map(ModelPreferences::clamped),
            system_prompt: draft.system_prompt,
            include_context: draft.include_context,
            max_tokens: draft.max_tokens,
            temperature: draft.temperature,
            stop_sequences: draft.stop_sequences,
            features: draft.features,
            estimated_cost: Some(estimated_cost),
            provider_id: Some(provider_id.to_string()),
            ..Default::default()
        }
    }

    /// Model call for this request, filling unset values from defaults
    pub fn invocation(&self, default_max_tokens: u32, default_temperature: f32) -> ModelInvocation {
        ModelInvocation {
            server_id: self.server_id.clone(),
            messages: self.messages.clone(),
            max_tokens: self.max_tokens.unwrap_or(default_max_tokens),
            temperature: Some(self.temperature.unwrap_or(default_temperature)),
            system_prompt: self.system_prompt.clone(),
            stop_sequences: self.stop_sequences.clone(),
            features: self.features,
        }
    }

    /// Shortened text of the first text message
    pub fn preview(&self) -> String {
        self.messages
            .iter()
            .find_map(|m| m.text())
            .map(|t| truncate_preview(t, sampling_constants::PREVIEW_CHARS))
            .unwrap_or_else(|| "[non-text content]".to_string())
    }

    /// Text of the final response, if any
    pub fn response_text(&self) -> Option<String> {
        self.response
            .as_ref()
            .map(|r| r.extracted_text())
            .filter(|t| !t.trim().is_empty())
    }

    /// Milliseconds since the request was created
    pub fn age_ms(&self) -> u64 {
        (Utc::now() - self.created_at).num_milliseconds().max(0) as u64
    }
}
