//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global and project (.sampling-lab/) level configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ai::provider::ProviderConfig;
use crate::constants::{
    history as history_constants, network as net_constants, retry as retry_constants,
    sampling as sampling_constants,
};
use crate::sampling::{RuleCondition, RoutingRule, SamplingMode};
use crate::types::{CostTable, ProviderCapabilities, ProviderFamily, Result, SamplingError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Id of the provider requests are sent to
    pub active_provider: Option<String>,

    /// Request defaults, routing and timing
    pub sampling: SamplingConfig,

    /// Backoff for transient provider failures
    pub retry: RetryConfig,

    /// History persistence
    pub storage: StorageConfig,

    /// Known providers
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            active_provider: Some("openai".to_string()),
            sampling: SamplingConfig::default(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            providers: default_providers(),
        }
    }
}

impl Config {
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn active_provider_config(&self) -> Option<&ProviderConfig> {
        self.active_provider
            .as_deref()
            .and_then(|id| self.provider(id))
    }

    /// Validate configuration values are within acceptable ranges.
    /// Returns `SamplingError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.sampling.default_temperature) {
            return Err(SamplingError::Config(format!(
                "Sampling default_temperature must be between 0.0 and 2.0, got {}",
                self.sampling.default_temperature
            )));
        }

        if self.sampling.request_timeout_secs == 0 {
            return Err(SamplingError::Config(
                "Sampling request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.sampling.refresh_interval_secs == 0 {
            return Err(SamplingError::Config(
                "Sampling refresh_interval_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(active) = &self.active_provider
            && self.provider(active).is_none()
        {
            return Err(SamplingError::Config(format!(
                "active_provider '{}' does not match any configured provider",
                active
            )));
        }

        for provider in &self.providers {
            if !provider.cost.is_valid() {
                return Err(SamplingError::Config(format!(
                    "Provider '{}' has a negative or non-finite cost entry",
                    provider.id
                )));
            }
        }

        for rule in &self.sampling.rules {
            if let RuleCondition::SafeContentPattern(pattern) = &rule.condition {
                Regex::new(pattern).map_err(|e| {
                    SamplingError::Config(format!(
                        "Rule '{}' has an invalid pattern: {}",
                        rule.name, e
                    ))
                })?;
            }
        }

        Ok(())
    }
}

// =============================================================================
// Sampling Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Completion budget when a draft leaves it unset
    pub default_max_tokens: u32,
    pub default_temperature: f32,

    /// How approved requests are dispatched
    pub mode: SamplingMode,

    /// Hybrid mode: use the human path when no rule matches
    pub fallback_to_human: bool,

    /// Quiet period before a draft estimate is recomputed (milliseconds)
    pub debounce_ms: u64,

    pub refresh_interval_secs: u64,

    /// Per-attempt provider call timeout
    pub request_timeout_secs: u64,

    /// Hybrid routing rules, evaluated in order
    pub rules: Vec<RoutingRule>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: sampling_constants::DEFAULT_MAX_TOKENS,
            default_temperature: sampling_constants::DEFAULT_TEMPERATURE,
            mode: SamplingMode::default(),
            fallback_to_human: true,
            debounce_ms: sampling_constants::DEBOUNCE_MS,
            refresh_interval_secs: net_constants::REFRESH_INTERVAL_SECS,
            request_timeout_secs: net_constants::REQUEST_TIMEOUT_SECS,
            rules: Vec::new(),
        }
    }
}

// =============================================================================
// Retry Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: retry_constants::DEFAULT_MAX_RETRIES,
            initial_delay_ms: retry_constants::INITIAL_DELAY_MS,
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// History snapshot file (defaults to .sampling-lab/history.json)
    pub history_path: Option<PathBuf>,
    pub max_persisted: usize,
    pub max_in_memory: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_path: None,
            max_persisted: history_constants::MAX_PERSISTED,
            max_in_memory: history_constants::MAX_IN_MEMORY,
        }
    }
}

// =============================================================================
// Default Providers
// =============================================================================

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            id: "openai".to_string(),
            name: "OpenAI".to_string(),
            family: ProviderFamily::OpenAi,
            model: "gpt-4o-mini".to_string(),
            cost: CostTable::new(0.00015, 0.0006),
            capabilities: ProviderCapabilities {
                supports_structured_outputs: true,
                supports_batch_processing: true,
                supports_computer_use: false,
                supports_thinking_tokens: false,
                max_context_tokens: 128_000,
            },
            ..Default::default()
        },
        ProviderConfig {
            id: "anthropic".to_string(),
            name: "Anthropic".to_string(),
            family: ProviderFamily::Anthropic,
            model: "claude-sonnet-4-5".to_string(),
            cost: CostTable::new(0.003, 0.015).with_thinking(0.015),
            capabilities: ProviderCapabilities {
                supports_structured_outputs: false,
                supports_batch_processing: true,
                supports_computer_use: true,
                supports_thinking_tokens: true,
                max_context_tokens: 200_000,
            },
            ..Default::default()
        },
        ProviderConfig {
            id: "ollama".to_string(),
            name: "Ollama".to_string(),
            family: ProviderFamily::Local,
            model: "llama3.2".to_string(),
            cost: CostTable::new(0.0, 0.0),
            capabilities: ProviderCapabilities {
                max_context_tokens: 8_192,
                ..Default::default()
            },
            ..Default::default()
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::RuleAction;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.sampling.default_max_tokens, 1000);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.storage.max_persisted, 50);
        assert_eq!(config.active_provider_config().unwrap().id, "openai");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_active_provider() {
        let config = Config {
            active_provider: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SamplingError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_temperature() {
        let mut config = Config::default();
        config.sampling.default_temperature = 2.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_cost() {
        let mut config = Config::default();
        config.providers[0].cost = CostTable::new(-0.1, 0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = Config::default();
        config.sampling.rules.push(RoutingRule {
            name: "broken".to_string(),
            enabled: true,
            condition: RuleCondition::SafeContentPattern("(unclosed".to_string()),
            action: RuleAction::AutoApprove,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_toml_roundtrip_skips_api_key() {
        let mut config = Config::default();
        config.providers[0].api_key = Some("sk-secret".to_string());
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("sk-secret"));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.providers.len(), 3);
        assert_eq!(parsed.providers[1].cost.thinking_cost_per_1k, Some(0.015));
    }
}
