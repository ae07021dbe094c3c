//! Provider status types
//!
//! Snapshot records describing configured providers, their pricing and
//! cumulative usage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider family, which determines the cost surcharge model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    /// Hosted, reasoning-effort output multipliers
    OpenAi,
    /// Hosted, extended-thinking token pool
    Anthropic,
    /// Locally hosted (Ollama or any OpenAI-compatible server)
    Local,
}

impl ProviderFamily {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }

    /// Environment variable consulted for an API key
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Local => None,
        }
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Local => write!(f, "local"),
        }
    }
}

impl FromStr for ProviderFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "local" | "ollama" => Ok(Self::Local),
            _ => Err(format!(
                "Invalid provider family '{}'. Valid values: openai, anthropic, local",
                s
            )),
        }
    }
}

/// Pricing per 1000 tokens in USD
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostTable {
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_cost_per_1k: Option<f64>,
}

impl CostTable {
    pub fn new(input_cost_per_1k: f64, output_cost_per_1k: f64) -> Self {
        Self {
            input_cost_per_1k,
            output_cost_per_1k,
            thinking_cost_per_1k: None,
        }
    }

    pub fn with_thinking(mut self, thinking_cost_per_1k: f64) -> Self {
        self.thinking_cost_per_1k = Some(thinking_cost_per_1k);
        self
    }

    /// True when no entry is negative or NaN
    pub fn is_valid(&self) -> bool {
        let ok = |v: f64| v.is_finite() && v >= 0.0;
        ok(self.input_cost_per_1k)
            && ok(self.output_cost_per_1k)
            && self.thinking_cost_per_1k.is_none_or(ok)
    }
}

/// Provider capability flags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderCapabilities {
    pub supports_structured_outputs: bool,
    pub supports_batch_processing: bool,
    pub supports_computer_use: bool,
    pub supports_thinking_tokens: bool,
    pub max_context_tokens: u32,
}

/// Cumulative usage for one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost: f64,
    pub average_response_time_ms: f64,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl UsageStats {
    /// Success ratio in [0, 1]; 0 when nothing has run
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}

/// Point-in-time view of one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub id: String,
    pub name: String,
    pub family: ProviderFamily,
    pub configured: bool,
    pub enabled: bool,
    pub default_model: String,
    pub capabilities: ProviderCapabilities,
    pub cost: CostTable,
    pub usage: UsageStats,
}
