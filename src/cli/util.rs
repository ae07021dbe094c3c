//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::sync::Arc;

use crate::ai::provider::{ConfigRegistry, ProviderStore, SharedProviderStore, create_transport};
use crate::config::{Config, ConfigLoader};
use crate::sampling::{HistoryStore, LifecycleManager};
use crate::types::{Result, SamplingError};

/// Command execution context
///
/// Provides unified access to the loaded configuration and the provider store
/// built from it.
#[derive(Clone)]
pub struct CommandContext {
    pub config: Config,
    pub providers: SharedProviderStore,
}

impl CommandContext {
    /// Load configuration and build the provider store
    pub fn load() -> Result<Self> {
        Self::from_config(ConfigLoader::load()?)
    }

    /// Load with the active provider replaced by `provider`, when given
    pub fn load_with_provider(provider: Option<&str>) -> Result<Self> {
        let mut config = ConfigLoader::load()?;
        if let Some(id) = provider {
            if config.provider(id).is_none() {
                let known: Vec<&str> = config.providers.iter().map(|p| p.id.as_str()).collect();
                return Err(SamplingError::Config(format!(
                    "Unknown provider '{}'. Known providers: {}",
                    id,
                    known.join(", ")
                )));
            }
            config.active_provider = Some(id.to_string());
        }
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let providers = Arc::new(ProviderStore::from_config(&config));
        Ok(Self { config, providers })
    }

    pub fn registry(&self) -> Result<ConfigRegistry> {
        ConfigRegistry::new(self.config.clone())
    }

    pub fn history_store(&self) -> HistoryStore {
        HistoryStore::new(ConfigLoader::history_path(&self.config))
            .with_max_persisted(self.config.storage.max_persisted)
    }

    /// Lifecycle manager wired to a transport for the active provider
    pub fn manager(&self) -> Result<LifecycleManager> {
        let provider = self.providers.require_active()?;
        let transport = create_transport(&provider, self.config.sampling.request_timeout_secs)?;
        LifecycleManager::from_config(&self.config, transport, Arc::clone(&self.providers))
    }
}

/// Short form of a request id for tables
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Dollar amount with enough precision for per-request costs
pub fn format_cost(cost: f64) -> String {
    if cost == 0.0 {
        "$0".to_string()
    } else if cost < 0.01 {
        format!("${:.6}", cost)
    } else {
        format!("${:.4}", cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_format_cost() {
        assert_eq!(format_cost(0.0), "$0");
        assert_eq!(format_cost(0.000055), "$0.000055");
        assert_eq!(format_cost(1.23456), "$1.2346");
    }

    #[test]
    fn test_context_from_default_config() {
        let ctx = CommandContext::from_config(Config::default()).unwrap();
        assert_eq!(ctx.providers.statuses().len(), 3);
        assert_eq!(ctx.providers.active_provider().unwrap().id, "openai");
    }
}
