//! Provider Registry and Store
//!
//! `ProviderRegistry` is the external source of provider status; `ProviderStore`
//! is the in-process snapshot the lifecycle manager reads and the only place
//! usage counters live. The store is injected, so tests swap in a fake
//! registry.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ProviderConfig;
use crate::ai::metrics::{RequestOutcome, UsageTracker};
use crate::ai::schedule::ScheduledTask;
use crate::config::Config;
use crate::constants::network as net_constants;
use crate::types::{ProviderFamily, ProviderStatus, Result, SamplingError, UsageStats};

// =============================================================================
// Registry Contract
// =============================================================================

/// Source of provider status and configuration
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    async fn list_provider_statuses(&self) -> Result<Vec<ProviderStatus>>;

    /// True when the active provider is configured
    async fn is_sampling_available(&self) -> Result<bool>;

    async fn get_active_provider_config(&self) -> Result<Option<ProviderConfig>>;

    /// Model ids served at `base_url`
    async fn fetch_available_models(&self, base_url: &str) -> Result<Vec<String>>;
}

// =============================================================================
// Config-backed Registry
// =============================================================================

/// Registry backed by the loaded configuration, listing models over HTTP
pub struct ConfigRegistry {
    config: Config,
    client: reqwest::Client,
}

impl ConfigRegistry {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(net_constants::MODEL_LIST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SamplingError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn provider_for_base(&self, base_url: &str) -> Option<&ProviderConfig> {
        let wanted = base_url.trim_end_matches('/');
        self.config
            .providers
            .iter()
            .find(|p| p.effective_base_url().trim_end_matches('/') == wanted)
    }

    async fn list_openai_models(
        &self,
        base_url: &str,
        provider: Option<&ProviderConfig>,
    ) -> Result<Vec<String>> {
        let url = format!("{}/models", base_url.trim_end_matches('/'));
        let mut request = self.client.get(&url);
        if let Some(provider) = provider
            && let Some(key) = provider.resolve_api_key()
        {
            request = match provider.family {
                ProviderFamily::Anthropic => request
                    .header("x-api-key", key)
                    .header("anthropic-version", "2023-06-01"),
                _ => request.header("Authorization", format!("Bearer {}", key)),
            };
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SamplingError::provider(
                base_url,
                format!("Model listing failed ({})", response.status()),
            ));
        }
        let body: ModelList = response.json().await?;
        Ok(body.data.into_iter().map(|m| m.id).collect())
    }

    async fn list_ollama_models(&self, base_url: &str) -> Result<Vec<String>> {
        let root = base_url.trim_end_matches('/').trim_end_matches("/v1");
        let response = self.client.get(format!("{}/api/tags", root)).send().await?;
        if !response.status().is_success() {
            return Err(SamplingError::provider(
                base_url,
                format!("Model listing failed ({})", response.status()),
            ));
        }
        let body: OllamaTags = response.json().await?;
        Ok(body.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl ProviderRegistry for ConfigRegistry {
    async fn list_provider_statuses(&self) -> Result<Vec<ProviderStatus>> {
        Ok(self.config.providers.iter().map(status_from_config).collect())
    }

    async fn is_sampling_available(&self) -> Result<bool> {
        Ok(self
            .config
            .active_provider_config()
            .is_some_and(ProviderConfig::is_configured))
    }

    async fn get_active_provider_config(&self) -> Result<Option<ProviderConfig>> {
        Ok(self.config.active_provider_config().cloned())
    }

    async fn fetch_available_models(&self, base_url: &str) -> Result<Vec<String>> {
        let provider = self.provider_for_base(base_url);
        match self.list_openai_models(base_url, provider).await {
            Ok(models) => Ok(models),
            Err(err) if provider.is_none_or(|p| p.family.is_local()) => {
                debug!(base_url, error = %err, "Falling back to Ollama model listing");
                self.list_ollama_models(base_url).await
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

/// Status record for a configured provider, usage zeroed
pub fn status_from_config(config: &ProviderConfig) -> ProviderStatus {
    ProviderStatus {
        id: config.id.clone(),
        name: config.name.clone(),
        family: config.family,
        configured: config.is_configured(),
        enabled: config.enabled,
        default_model: config.model.clone(),
        capabilities: config.capabilities.clone(),
        cost: config.cost.clone(),
        usage: UsageStats::default(),
    }
}

// =============================================================================
// Provider Store
// =============================================================================

/// Injected store of provider status, the active provider and usage counters.
///
/// Only the lifecycle manager records usage, and only on terminal outcomes.
#[derive(Debug, Default)]
pub struct ProviderStore {
    statuses: RwLock<Vec<ProviderStatus>>,
    active: RwLock<Option<ProviderConfig>>,
    usage: DashMap<String, UsageTracker>,
}

pub type SharedProviderStore = Arc<ProviderStore>;

impl ProviderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store straight from configuration
    pub fn from_config(config: &Config) -> Self {
        let store = Self::new();
        store.replace_snapshot(
            config.providers.iter().map(status_from_config).collect(),
            config.active_provider_config().cloned(),
        );
        store
    }

    /// Swap in a new snapshot; usage counters survive reconciliation
    pub fn replace_snapshot(&self, statuses: Vec<ProviderStatus>, active: Option<ProviderConfig>) {
        for status in &statuses {
            self.usage.entry(status.id.clone()).or_default();
        }
        *self.statuses.write().unwrap_or_else(|poisoned| {
            tracing::error!("Provider statuses RwLock poisoned, recovering");
            poisoned.into_inner()
        }) = statuses;
        *self.active.write().unwrap_or_else(|poisoned| {
            tracing::error!("Active provider RwLock poisoned, recovering");
            poisoned.into_inner()
        }) = active;
    }

    /// Pull the latest snapshot from a registry
    pub async fn refresh(&self, registry: &dyn ProviderRegistry) -> Result<()> {
        let statuses = registry.list_provider_statuses().await?;
        let active = registry.get_active_provider_config().await?;
        debug!(
            providers = statuses.len(),
            active = active.as_ref().map(|a| a.id.as_str()).unwrap_or("none"),
            "Provider snapshot refreshed"
        );
        self.replace_snapshot(statuses, active);
        Ok(())
    }

    /// Refresh from `registry` every `period`, first run immediately
    pub fn spawn_refresh(
        self: &Arc<Self>,
        registry: Arc<dyn ProviderRegistry>,
        period: Duration,
    ) -> ScheduledTask {
        let store = Arc::clone(self);
        info!(period_secs = period.as_secs(), "Starting provider refresh");
        ScheduledTask::periodic(period, move || {
            let store = Arc::clone(&store);
            let registry = Arc::clone(&registry);
            async move {
                if let Err(e) = store.refresh(registry.as_ref()).await {
                    warn!(error = %e, "Provider refresh failed, keeping previous snapshot");
                }
            }
        })
    }

    /// Statuses with current usage merged in
    pub fn statuses(&self) -> Vec<ProviderStatus> {
        let statuses = self.statuses.read().unwrap_or_else(|poisoned| {
            tracing::error!("Provider statuses RwLock poisoned on read, recovering");
            poisoned.into_inner()
        });
        statuses
            .iter()
            .cloned()
            .map(|mut status| {
                status.usage = self.usage(&status.id);
                status
            })
            .collect()
    }

    pub fn status(&self, id: &str) -> Option<ProviderStatus> {
        self.statuses().into_iter().find(|s| s.id == id)
    }

    pub fn active_provider(&self) -> Option<ProviderConfig> {
        self.active
            .read()
            .unwrap_or_else(|poisoned| {
                tracing::error!("Active provider RwLock poisoned on read, recovering");
                poisoned.into_inner()
            })
            .clone()
    }

    /// The active provider, or a configuration error when there is none or it
    /// is not usable
    pub fn require_active(&self) -> Result<ProviderConfig> {
        let active = self.active_provider().ok_or_else(|| {
            SamplingError::Config("No active provider selected".to_string())
        })?;

        let configured = self
            .status(&active.id)
            .map(|s| s.configured)
            .unwrap_or_else(|| active.is_configured());
        if !configured {
            return Err(SamplingError::Config(format!(
                "Active provider '{}' is not configured",
                active.id
            )));
        }
        Ok(active)
    }

    pub fn is_sampling_available(&self) -> bool {
        self.require_active().is_ok()
    }

    /// Record one terminal outcome against `provider_id`
    pub fn record(&self, provider_id: &str, outcome: &RequestOutcome) {
        self.usage
            .entry(provider_id.to_string())
            .or_default()
            .record(outcome);
    }

    pub fn usage(&self, provider_id: &str) -> UsageStats {
        self.usage
            .get(provider_id)
            .map(|t| t.snapshot())
            .unwrap_or_default()
    }

    /// Human-readable configuration problems
    pub fn configuration_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let statuses = self.statuses();

        for status in statuses.iter().filter(|s| s.enabled && !s.configured) {
            let hint = status
                .family
                .default_api_key_env()
                .map(|var| format!(" (set {})", var))
                .unwrap_or_default();
            issues.push(format!(
                "Provider '{}' is enabled but has no API key{}",
                status.id, hint
            ));
        }

        match self.active_provider() {
            None => issues.push("No active provider selected".to_string()),
            Some(active) => match statuses.iter().find(|s| s.id == active.id) {
                None => issues.push(format!(
                    "Active provider '{}' is not in the provider list",
                    active.id
                )),
                Some(status) if !status.enabled => {
                    issues.push(format!("Active provider '{}' is disabled", active.id))
                }
                _ => {}
            },
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::TokenUsage;
    use crate::types::CostTable;

    pub(crate) struct FakeRegistry {
        pub statuses: Vec<ProviderStatus>,
        pub active: Option<ProviderConfig>,
    }

    #[async_trait]
    impl ProviderRegistry for FakeRegistry {
        async fn list_provider_statuses(&self) -> Result<Vec<ProviderStatus>> {
            Ok(self.statuses.clone())
        }

        async fn is_sampling_available(&self) -> Result<bool> {
            Ok(self.active.is_some())
        }

        async fn get_active_provider_config(&self) -> Result<Option<ProviderConfig>> {
            Ok(self.active.clone())
        }

        async fn fetch_available_models(&self, _base_url: &str) -> Result<Vec<String>> {
            Ok(vec!["fake-model".to_string()])
        }
    }

    fn local(id: &str) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            name: id.to_string(),
            family: ProviderFamily::Local,
            model: "llama3.2".to_string(),
            cost: CostTable::default(),
            ..Default::default()
        }
    }

    fn fake(active: Option<&str>) -> FakeRegistry {
        let providers = [local("ollama"), local("lmstudio")];
        FakeRegistry {
            statuses: providers.iter().map(status_from_config).collect(),
            active: active.and_then(|id| providers.iter().find(|p| p.id == id).cloned()),
        }
    }

    #[tokio::test]
    async fn test_refresh_and_require_active() {
        let store = ProviderStore::new();
        assert!(store.require_active().is_err());

        store.refresh(&fake(Some("ollama"))).await.unwrap();
        assert_eq!(store.require_active().unwrap().id, "ollama");
        assert_eq!(store.statuses().len(), 2);
        assert!(store.is_sampling_available());
    }

    #[tokio::test]
    async fn test_unconfigured_active_rejected() {
        let hosted = ProviderConfig {
            id: "openai".to_string(),
            api_key_env: Some("SAMPLING_LAB_TEST_MISSING".to_string()),
            ..Default::default()
        };
        let registry = FakeRegistry {
            statuses: vec![status_from_config(&hosted)],
            active: Some(hosted),
        };
        let store = ProviderStore::new();
        store.refresh(&registry).await.unwrap();

        let err = store.require_active().unwrap_err();
        assert!(err.to_string().contains("not configured"));
        assert!(
            store
                .configuration_issues()
                .iter()
                .any(|i| i.contains("no API key"))
        );
    }

    #[tokio::test]
    async fn test_usage_survives_refresh() {
        let store = ProviderStore::new();
        store.refresh(&fake(Some("ollama"))).await.unwrap();
        store.record(
            "ollama",
            &RequestOutcome::success(100, Some(TokenUsage::from_openai(1, 2)), None),
        );

        store.refresh(&fake(Some("lmstudio"))).await.unwrap();
        assert_eq!(store.usage("ollama").total_requests, 1);
        assert_eq!(store.status("ollama").unwrap().usage.successful_requests, 1);
        assert_eq!(store.require_active().unwrap().id, "lmstudio");
    }

    #[test]
    fn test_issues_without_active() {
        let store = ProviderStore::new();
        store.replace_snapshot(vec![status_from_config(&local("ollama"))], None);
        assert_eq!(store.configuration_issues(), vec!["No active provider selected"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_refresh_applies_snapshot() {
        let store = Arc::new(ProviderStore::new());
        let registry: Arc<dyn ProviderRegistry> = Arc::new(fake(Some("ollama")));
        let _task = store.spawn_refresh(registry, Duration::from_secs(30));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.require_active().unwrap().id, "ollama");
    }

    #[tokio::test]
    async fn test_config_registry_statuses() {
        let config = Config::default();
        let registry = ConfigRegistry::new(config.clone()).unwrap();
        let statuses = registry.list_provider_statuses().await.unwrap();
        assert_eq!(statuses.len(), config.providers.len());
        assert!(
            statuses
                .iter()
                .any(|s| s.family == ProviderFamily::Local && s.configured)
        );
    }
}
