//! Debounced draft cost estimation
//!
//! Recomputes the estimate once edits have been quiet for the debounce
//! period. Purely informational; submission never waits on it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use super::request::SamplingDraft;
use crate::ai::cost::{CostEstimate, CostEstimator};
use crate::ai::provider::SharedProviderStore;
use crate::ai::schedule::Debouncer;
use crate::types::{Result, SamplingError};

pub struct DraftEstimator {
    providers: SharedProviderStore,
    debouncer: Debouncer,
    default_max_tokens: u32,
    latest: Arc<watch::Sender<Option<CostEstimate>>>,
}

impl DraftEstimator {
    pub fn new(providers: SharedProviderStore, debounce: Duration, default_max_tokens: u32) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            providers,
            debouncer: Debouncer::new(debounce),
            default_max_tokens,
            latest: Arc::new(latest),
        }
    }

    /// Estimate against the active provider right away
    pub fn estimate_now(&self, draft: &SamplingDraft) -> Result<CostEstimate> {
        estimate(&self.providers, draft, self.default_max_tokens)
    }

    /// Schedule a recompute, superseding any pending one
    pub fn update(&self, draft: SamplingDraft) {
        let providers = Arc::clone(&self.providers);
        let latest = Arc::clone(&self.latest);
        let default_max_tokens = self.default_max_tokens;

        self.debouncer.call(async move {
            match estimate(&providers, &draft, default_max_tokens) {
                Ok(value) => {
                    debug!(total = value.total, surcharge = value.surcharge, "Draft estimate updated");
                    latest.send_replace(Some(value));
                }
                Err(e) => {
                    debug!(error = %e, "Draft estimate unavailable");
                    latest.send_replace(None);
                }
            }
        });
    }

    /// Drop any pending recompute
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }

    pub fn current(&self) -> Option<CostEstimate> {
        *self.latest.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CostEstimate>> {
        self.latest.subscribe()
    }
}

fn estimate(
    providers: &SharedProviderStore,
    draft: &SamplingDraft,
    default_max_tokens: u32,
) -> Result<CostEstimate> {
    let provider = providers
        .active_provider()
        .ok_or_else(|| SamplingError::Config("No active provider selected".to_string()))?;
    Ok(CostEstimator::new(provider.family, provider.cost).estimate(
        &draft.messages,
        draft.max_tokens.unwrap_or(default_max_tokens),
        &draft.features,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::cost::{FeatureFlags, ThinkingBudget};
    use crate::ai::provider::registry::status_from_config;
    use crate::ai::provider::{ProviderConfig, ProviderStore};
    use crate::types::{CostTable, ProviderFamily};

    fn store(family: ProviderFamily, cost: CostTable) -> SharedProviderStore {
        let config = ProviderConfig {
            id: "p".to_string(),
            family,
            cost,
            ..Default::default()
        };
        let store = ProviderStore::new();
        store.replace_snapshot(vec![status_from_config(&config)], Some(config));
        Arc::new(store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_edit_is_estimated() {
        let estimator = DraftEstimator::new(
            store(ProviderFamily::OpenAi, CostTable::new(0.0015, 0.002)),
            Duration::from_millis(300),
            1000,
        );

        estimator.update(SamplingDraft::text("fs", "a much longer draft message"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        estimator.update(SamplingDraft::text("fs", "Hello").with_max_tokens(500));
        assert!(estimator.current().is_none());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let estimate = estimator.current().unwrap();
        assert_eq!(estimate.input_tokens, 2);
        assert!((estimate.total - 0.0003).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending() {
        let estimator = DraftEstimator::new(
            store(ProviderFamily::OpenAi, CostTable::new(0.0015, 0.002)),
            Duration::from_millis(300),
            1000,
        );
        estimator.update(SamplingDraft::text("fs", "Hello"));
        estimator.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(estimator.current().is_none());
    }

    #[tokio::test]
    async fn test_estimate_now_with_thinking() {
        let estimator = DraftEstimator::new(
            store(
                ProviderFamily::Anthropic,
                CostTable::new(0.003, 0.015).with_thinking(0.015),
            ),
            Duration::from_millis(300),
            1000,
        );
        let draft = SamplingDraft::text("fs", "x".repeat(4000)).with_features(FeatureFlags {
            thinking: Some(ThinkingBudget::High),
            ..Default::default()
        });
        let estimate = estimator.estimate_now(&draft).unwrap();
        // 1000 input tokens, 600 thinking tokens at 0.015/1k
        assert!((estimate.surcharge - 0.009).abs() < 1e-9);
    }

    #[test]
    fn test_no_active_provider() {
        let estimator =
            DraftEstimator::new(Arc::new(ProviderStore::new()), Duration::from_millis(1), 10);
        assert!(matches!(
            estimator.estimate_now(&SamplingDraft::text("fs", "hi")),
            Err(SamplingError::Config(_))
        ));
    }
}
