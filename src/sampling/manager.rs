//! Request Lifecycle Manager
//!
//! Owns the bounded in-memory request history and drives every status change
//! through [`transition`]. Provider calls run inside the retry controller with
//! a per-attempt timeout; whatever comes back goes through the response
//! validator before the request reaches a terminal state. Usage statistics are
//! recorded exactly once per terminal outcome of an approved request.
//!
//! ## Usage
//!
//! ```ignore
//! let manager = Arc::new(LifecycleManager::from_config(&config, transport, store)?);
//! let request = manager.submit(SamplingDraft::text("filesystem", "Hello"))?;
//! let done = manager.approve_ai(&request.id).await?;
//! ```

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::history::{HistorySnapshot, HistoryStore};
use super::request::{DispatchPath, SamplingDraft, SamplingRequest};
use super::routing::{RouteDecision, Router};
use super::state::{RequestStatus, StatusEvent, transition};
use crate::ai::cost::{CostEstimator, actual_cost};
use crate::ai::metrics::RequestOutcome;
use crate::ai::provider::{
    CompletionEnvelope, HitlStatus, SharedProviderStore, SharedTransport,
};
use crate::ai::retry::RetryPolicy;
use crate::ai::timeout::{TimeoutConfig, with_timeout};
use crate::ai::validation::ResponseValidator;
use crate::config::{Config, ConfigLoader};
use crate::constants::{history as history_constants, sampling as sampling_constants};
use crate::types::{CostTable, RequestId, Result, SamplingError};

const INTERRUPTED: &str = "Interrupted before completion";
const REVIEWER_REJECTED: &str = "Rejected by reviewer";

// =============================================================================
// Lifecycle Events
// =============================================================================

/// Notification published on every status change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LifecycleEvent {
    #[serde(rename_all = "camelCase")]
    RequestPending {
        id: RequestId,
        server_name: String,
        preview: String,
    },
    RequestApproved {
        id: RequestId,
        dispatch: DispatchPath,
    },
    RequestRejected {
        id: RequestId,
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RequestCompleted {
        id: RequestId,
        duration_ms: u64,
        cost: Option<f64>,
    },
    RequestFailed {
        id: RequestId,
        error: String,
    },
}

impl LifecycleEvent {
    pub fn id(&self) -> &RequestId {
        match self {
            Self::RequestPending { id, .. }
            | Self::RequestApproved { id, .. }
            | Self::RequestRejected { id, .. }
            | Self::RequestCompleted { id, .. }
            | Self::RequestFailed { id, .. } => id,
        }
    }
}

/// Request counts by status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub completed: usize,
    pub rejected: usize,
    pub error: usize,
    /// Sum of actual costs
    pub total_cost: f64,
}

impl RequestStats {
    pub fn from_requests<'a>(requests: impl IntoIterator<Item = &'a SamplingRequest>) -> Self {
        let mut stats = Self::default();
        for request in requests {
            stats.total += 1;
            match request.status {
                RequestStatus::Pending => stats.pending += 1,
                RequestStatus::Approved => stats.approved += 1,
                RequestStatus::Completed => stats.completed += 1,
                RequestStatus::Rejected => stats.rejected += 1,
                RequestStatus::Error => stats.error += 1,
            }
            stats.total_cost += request.cost.unwrap_or(0.0);
        }
        stats
    }
}

// =============================================================================
// Manager
// =============================================================================

pub struct LifecycleManager {
    transport: SharedTransport,
    providers: SharedProviderStore,
    retry: RetryPolicy,
    timeouts: TimeoutConfig,
    router: Router,
    default_max_tokens: u32,
    default_temperature: f32,
    capacity: usize,
    requests: RwLock<VecDeque<SamplingRequest>>,
    events: broadcast::Sender<LifecycleEvent>,
    history: Option<HistoryStore>,
}

impl LifecycleManager {
    pub fn new(transport: SharedTransport, providers: SharedProviderStore) -> Self {
        let (events, _) = broadcast::channel(sampling_constants::EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            providers,
            retry: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
            router: Router::default(),
            default_max_tokens: sampling_constants::DEFAULT_MAX_TOKENS,
            default_temperature: sampling_constants::DEFAULT_TEMPERATURE,
            capacity: history_constants::MAX_IN_MEMORY,
            requests: RwLock::new(VecDeque::new()),
            events,
            history: None,
        }
    }

    /// Manager wired from configuration, persisting to the configured history path
    pub fn from_config(
        config: &Config,
        transport: SharedTransport,
        providers: SharedProviderStore,
    ) -> Result<Self> {
        let history = HistoryStore::new(ConfigLoader::history_path(config))
            .with_max_persisted(config.storage.max_persisted);

        Ok(Self::new(transport, providers)
            .with_retry(RetryPolicy::from(&config.retry))
            .with_timeouts(TimeoutConfig::from(&config.sampling))
            .with_router(Router::from_config(&config.sampling)?)
            .with_defaults(
                config.sampling.default_max_tokens,
                config.sampling.default_temperature,
            )
            .with_capacity(config.storage.max_in_memory)
            .with_history(history))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn with_defaults(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.default_max_tokens = max_tokens;
        self.default_temperature = temperature;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    pub fn providers(&self) -> &SharedProviderStore {
        &self.providers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get(&self, id: &RequestId) -> Option<SamplingRequest> {
        self.read_requests().iter().find(|r| r.id == *id).cloned()
    }

    /// Newest first
    pub fn list(&self) -> Vec<SamplingRequest> {
        self.read_requests().iter().cloned().collect()
    }

    pub fn stats(&self) -> RequestStats {
        RequestStats::from_requests(self.read_requests().iter())
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Create a pending request with a cost estimate.
    ///
    /// Fails without creating anything when no configured provider is active.
    #[instrument(skip(self, draft), fields(server = %draft.server_id))]
    pub fn submit(&self, draft: SamplingDraft) -> Result<SamplingRequest> {
        let provider = self.providers.require_active()?;
        if draft.is_empty() {
            return Err(SamplingError::Validation(
                "Request has no message content".to_string(),
            ));
        }

        let estimate = CostEstimator::new(provider.family, provider.cost.clone()).estimate(
            &draft.messages,
            draft.max_tokens.unwrap_or(self.default_max_tokens),
            &draft.features,
        );
        let request = SamplingRequest::from_draft(draft, estimate.total, &provider.id);

        {
            let mut requests = self.write_requests();
            requests.push_front(request.clone());
            evict_overflow(&mut requests, self.capacity);
        }

        info!(
            request_id = %request.id,
            provider = %provider.id,
            estimated_cost = estimate.total,
            "Sampling request pending"
        );
        self.emit(LifecycleEvent::RequestPending {
            id: request.id.clone(),
            server_name: request.server_name.clone(),
            preview: request.preview(),
        });
        Ok(request)
    }

    /// Reject a pending request; no provider call, no usage update
    pub fn reject(&self, id: &RequestId) -> Result<SamplingRequest> {
        self.reject_with_reason(id, None)
    }

    fn reject_with_reason(&self, id: &RequestId, reason: Option<String>) -> Result<SamplingRequest> {
        let request = self.update(id, |req| {
            apply(req, StatusEvent::Reject)?;
            req.error = reason.clone();
            Ok(req.clone())
        })?;

        info!(request_id = %id, reason = reason.as_deref().unwrap_or(""), "Sampling request rejected");
        self.emit(LifecycleEvent::RequestRejected {
            id: id.clone(),
            reason,
        });
        Ok(request)
    }

    fn mark_approved(&self, id: &RequestId, path: DispatchPath) -> Result<SamplingRequest> {
        let request = self.update(id, |req| {
            apply(req, StatusEvent::Approve)?;
            req.dispatch = Some(path);
            Ok(req.clone())
        })?;

        debug!(request_id = %id, dispatch = %path, "Sampling request approved");
        self.emit(LifecycleEvent::RequestApproved {
            id: id.clone(),
            dispatch: path,
        });
        Ok(request)
    }

    // =========================================================================
    // AI Path
    // =========================================================================

    /// Approve and run the model call to a terminal state.
    ///
    /// Provider failures end up in the request, not in the returned `Result`;
    /// errors here mean the request was unknown or not pending.
    #[instrument(skip(self), fields(request_id = %id))]
    pub async fn approve_ai(&self, id: &RequestId) -> Result<SamplingRequest> {
        let request = self.mark_approved(id, DispatchPath::Ai)?;
        self.process_ai(request).await
    }

    /// Approve now and process on an independent task
    pub fn dispatch(self: &Arc<Self>, id: &RequestId) -> Result<JoinHandle<Result<SamplingRequest>>> {
        let request = self.mark_approved(id, DispatchPath::Ai)?;
        let manager = Arc::clone(self);
        Ok(tokio::spawn(async move { manager.process_ai(request).await }))
    }

    async fn process_ai(&self, request: SamplingRequest) -> Result<SamplingRequest> {
        let started = Instant::now();
        let invocation = request.invocation(self.default_max_tokens, self.default_temperature);
        let timeout = self.timeouts.model_call;
        let transport = Arc::clone(&self.transport);

        debug!(
            request_id = %request.id,
            transport = transport.name(),
            max_tokens = invocation.max_tokens,
            "Invoking provider"
        );

        let result = self
            .retry
            .run(|| {
                let transport = Arc::clone(&transport);
                let invocation = invocation.clone();
                async move {
                    with_timeout(timeout, transport.invoke_model(&invocation), "model call").await
                }
            })
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let outcome = match result {
            Ok(envelope) => validated(Some(envelope)),
            Err(e) => {
                warn!(
                    request_id = %request.id,
                    category = %e.category(),
                    error = %e,
                    "Provider call failed"
                );
                Err(e.to_string())
            }
        };
        self.finish(&request.id, outcome, duration_ms)
    }

    // =========================================================================
    // Human Path
    // =========================================================================

    /// Hand a pending request to the transport's review channel, once.
    ///
    /// A review that is still open leaves the request pending with
    /// `dispatch = hitl`; the result arrives later through [`Self::resolve_manual`].
    #[instrument(skip(self), fields(request_id = %id))]
    pub async fn approve_human(&self, id: &RequestId) -> Result<SamplingRequest> {
        let request = self
            .get(id)
            .ok_or_else(|| SamplingError::RequestNotFound(id.to_string()))?;
        transition(id.as_str(), request.status, StatusEvent::Approve)?;

        let started = Instant::now();
        let outcome = with_timeout(
            self.timeouts.model_call,
            self.transport
                .invoke_hitl(&request.server_id, &request.server_name, &request),
            "human review",
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(hitl) => match hitl.status {
                HitlStatus::Pending => {
                    info!(request_id = %id, "Awaiting human review");
                    self.update(id, |req| {
                        req.dispatch = Some(DispatchPath::Hitl);
                        Ok(req.clone())
                    })
                }
                HitlStatus::Rejected => {
                    self.reject_with_reason(id, Some(REVIEWER_REJECTED.to_string()))
                }
                HitlStatus::Completed => {
                    self.mark_approved(id, DispatchPath::Hitl)?;
                    self.finish(id, validated(hitl.response), duration_ms)
                }
            },
            Err(e) => {
                warn!(request_id = %id, error = %e, "Human review channel failed");
                self.mark_approved(id, DispatchPath::Hitl)?;
                self.finish(id, Err(e.to_string()), duration_ms)
            }
        }
    }

    /// Apply a review result that arrived out of band
    #[instrument(skip(self, result), fields(request_id = %id))]
    pub fn resolve_manual(
        &self,
        id: &RequestId,
        result: Option<CompletionEnvelope>,
    ) -> Result<SamplingRequest> {
        let request = self.mark_approved(id, DispatchPath::Hitl)?;
        self.finish(id, validated(result), request.age_ms())
    }

    // =========================================================================
    // Routing
    // =========================================================================

    pub fn route(&self, id: &RequestId) -> Result<RouteDecision> {
        let request = self
            .get(id)
            .ok_or_else(|| SamplingError::RequestNotFound(id.to_string()))?;
        Ok(self.router.decide(&request))
    }

    /// Route a pending request and follow the chosen path
    pub async fn auto_route(&self, id: &RequestId) -> Result<SamplingRequest> {
        let decision = self.route(id)?;
        debug!(request_id = %id, mode = %self.router.mode(), ?decision, "Routing request");
        match decision {
            RouteDecision::Ai => self.approve_ai(id).await,
            RouteDecision::Hitl => self.approve_human(id).await,
            RouteDecision::Reject(reason) => self.reject_with_reason(id, Some(reason)),
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    fn finish(
        &self,
        id: &RequestId,
        outcome: std::result::Result<CompletionEnvelope, String>,
        duration_ms: u64,
    ) -> Result<SamplingRequest> {
        let provider_id = self
            .get(id)
            .and_then(|r| r.provider_id)
            .unwrap_or_else(|| "unknown".to_string());
        let cost_table = self.cost_table(&provider_id);

        let request = self.update(id, |req| {
            match &outcome {
                Ok(envelope) => {
                    apply(req, StatusEvent::Complete)?;
                    req.stop_reason = envelope.stop_reason.clone();
                    req.model = envelope.model.clone();
                    req.usage = envelope.usage;
                    req.cost = envelope
                        .usage
                        .zip(cost_table.as_ref())
                        .map(|(usage, table)| actual_cost(&usage, table));
                    req.response = Some(envelope.clone());
                    req.error = None;
                }
                Err(message) => {
                    apply(req, StatusEvent::Fail)?;
                    req.error = Some(message.clone());
                    req.response = Some(CompletionEnvelope::error(message.clone()));
                }
            }
            req.duration = Some(duration_ms);
            Ok(req.clone())
        })?;

        match request.status {
            RequestStatus::Completed => {
                self.providers.record(
                    &provider_id,
                    &RequestOutcome::success(duration_ms, request.usage, request.cost),
                );
                info!(
                    request_id = %id,
                    provider = %provider_id,
                    duration_ms,
                    cost = request.cost.unwrap_or(0.0),
                    stop_reason = request.stop_reason.as_deref().unwrap_or("unknown"),
                    "Sampling request completed"
                );
                self.emit(LifecycleEvent::RequestCompleted {
                    id: id.clone(),
                    duration_ms,
                    cost: request.cost,
                });
            }
            _ => {
                self.providers
                    .record(&provider_id, &RequestOutcome::failure(duration_ms));
                let error = request.error.clone().unwrap_or_default();
                warn!(request_id = %id, provider = %provider_id, error = %error, "Sampling request failed");
                self.emit(LifecycleEvent::RequestFailed {
                    id: id.clone(),
                    error,
                });
            }
        }
        Ok(request)
    }

    fn cost_table(&self, provider_id: &str) -> Option<CostTable> {
        self.providers
            .status(provider_id)
            .map(|s| s.cost)
            .or_else(|| {
                self.providers
                    .active_provider()
                    .filter(|p| p.id == provider_id)
                    .map(|p| p.cost)
            })
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Replace in-memory history from a snapshot.
    ///
    /// Requests that were in flight when the snapshot was taken cannot resume
    /// and are failed. Returns the saved draft.
    pub fn restore(&self, snapshot: HistorySnapshot) -> Option<SamplingDraft> {
        let mut restored: VecDeque<SamplingRequest> = snapshot
            .requests
            .into_iter()
            .map(|mut req| {
                if req.status == RequestStatus::Approved
                    && let Ok(status) = transition(req.id.as_str(), req.status, StatusEvent::Fail)
                {
                    req.status = status;
                    req.error = Some(INTERRUPTED.to_string());
                    req.response = Some(CompletionEnvelope::error(INTERRUPTED));
                }
                req
            })
            .collect();
        restored.truncate(self.capacity);

        debug!(requests = restored.len(), "Restored request history");
        *self.write_requests() = restored;
        snapshot.draft
    }

    /// Load the persisted snapshot into memory; no-op without a history store
    pub async fn load_persisted(&self) -> Option<SamplingDraft> {
        let history = self.history.as_ref()?;
        let snapshot = history.load().await;
        self.restore(snapshot)
    }

    /// Save in-memory requests ahead of older persisted ones
    pub async fn persist(&self, draft: Option<SamplingDraft>) -> Result<()> {
        let Some(history) = &self.history else {
            return Ok(());
        };
        history.merge_and_save(self.list(), draft).await?;
        Ok(())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is normal operation
        let _ = self.events.send(event);
    }

    fn update<T>(
        &self,
        id: &RequestId,
        f: impl FnOnce(&mut SamplingRequest) -> Result<T>,
    ) -> Result<T> {
        let mut requests = self.write_requests();
        let request = requests
            .iter_mut()
            .find(|r| r.id == *id)
            .ok_or_else(|| SamplingError::RequestNotFound(id.to_string()))?;
        f(request)
    }

    fn read_requests(&self) -> RwLockReadGuard<'_, VecDeque<SamplingRequest>> {
        self.requests.read().unwrap_or_else(|poisoned| {
            tracing::error!("Request history RwLock poisoned on read, recovering");
            poisoned.into_inner()
        })
    }

    fn write_requests(&self) -> RwLockWriteGuard<'_, VecDeque<SamplingRequest>> {
        self.requests.write().unwrap_or_else(|poisoned| {
            tracing::error!("Request history RwLock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn apply(request: &mut SamplingRequest, event: StatusEvent) -> Result<()> {
    request.status = transition(request.id.as_str(), request.status, event)?;
    Ok(())
}

fn validated(result: Option<CompletionEnvelope>) -> std::result::Result<CompletionEnvelope, String> {
    let verdict = ResponseValidator::validate(result.as_ref());
    match (verdict.valid, result) {
        (true, Some(envelope)) => Ok(envelope),
        _ => Err(verdict
            .reason
            .unwrap_or_else(|| "empty or null response".to_string())),
    }
}

/// Drop the oldest requests beyond `capacity`; in-flight requests are kept
fn evict_overflow(requests: &mut VecDeque<SamplingRequest>, capacity: usize) {
    while requests.len() > capacity {
        match requests
            .iter()
            .rposition(|r| r.status != RequestStatus::Approved)
        {
            Some(index) => {
                requests.remove(index);
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::registry::status_from_config;
    use crate::ai::provider::{
        HitlOutcome, ModelInvocation, ProviderConfig, ProviderStore, SamplingTransport,
        TokenUsage,
    };
    use crate::sampling::routing::{RuleAction, RuleCondition, RoutingRule, SamplingMode};
    use crate::types::ProviderFamily;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct MockTransport {
        calls: AtomicU32,
        hitl_calls: AtomicU32,
        responses: Mutex<VecDeque<Result<CompletionEnvelope>>>,
        hitl: Mutex<Option<HitlOutcome>>,
        hitl_error: Mutex<Option<String>>,
    }

    impl MockTransport {
        fn new(responses: Vec<Result<CompletionEnvelope>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                hitl_calls: AtomicU32::new(0),
                responses: Mutex::new(responses.into()),
                hitl: Mutex::new(None),
                hitl_error: Mutex::new(None),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SamplingTransport for MockTransport {
        async fn invoke_model(&self, _invocation: &ModelInvocation) -> Result<CompletionEnvelope> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(CompletionEnvelope::completed("ok", "mock", None, None)))
        }

        async fn invoke_hitl(
            &self,
            _server_id: &str,
            _server_name: &str,
            _request: &SamplingRequest,
        ) -> Result<HitlOutcome> {
            self.hitl_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = self.hitl_error.lock().unwrap().clone() {
                return Err(SamplingError::provider("test", message));
            }
            Ok(self
                .hitl
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(HitlOutcome::pending))
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn provider() -> ProviderConfig {
        ProviderConfig {
            id: "test".to_string(),
            name: "Test".to_string(),
            family: ProviderFamily::Local,
            model: "mock".to_string(),
            cost: CostTable::new(0.0015, 0.002),
            ..Default::default()
        }
    }

    fn store() -> SharedProviderStore {
        let store = ProviderStore::new();
        store.replace_snapshot(vec![status_from_config(&provider())], Some(provider()));
        Arc::new(store)
    }

    fn manager(transport: Arc<MockTransport>) -> LifecycleManager {
        LifecycleManager::new(transport, store())
    }

    fn draft() -> SamplingDraft {
        SamplingDraft::text("fs", "Hello").with_max_tokens(500)
    }

    #[test]
    fn test_submit_creates_pending_request() {
        let manager = manager(MockTransport::new(vec![]));
        let mut events = manager.subscribe();

        let request = manager.submit(draft()).unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.response.is_none());
        assert_eq!(manager.list().len(), 1);
        assert!(matches!(
            events.try_recv().unwrap(),
            LifecycleEvent::RequestPending { .. }
        ));
    }

    #[test]
    fn test_submit_without_provider_creates_nothing() {
        let manager = LifecycleManager::new(MockTransport::new(vec![]), Arc::new(ProviderStore::new()));
        let err = manager.submit(draft()).unwrap_err();
        assert!(matches!(err, SamplingError::Config(_)));
        assert!(manager.list().is_empty());
    }

    #[test]
    fn test_reject_pending() {
        let transport = MockTransport::new(vec![]);
        let manager = manager(Arc::clone(&transport));
        let request = manager.submit(draft()).unwrap();

        let rejected = manager.reject(&request.id).unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert!(rejected.response.is_none());
        assert!(matches!(
            manager.reject(&request.id),
            Err(SamplingError::InvalidTransition { .. })
        ));
        assert_eq!(transport.calls(), 0);
        assert_eq!(manager.providers().usage("test").total_requests, 0);
    }

    #[tokio::test]
    async fn test_end_to_end_cost() {
        let transport = MockTransport::new(vec![Ok(CompletionEnvelope::completed(
            "Hi there",
            "mock-1",
            Some("end_turn".to_string()),
            Some(TokenUsage::from_openai(10, 20)),
        ))]);
        let manager = manager(Arc::clone(&transport));

        let request = manager.submit(draft()).unwrap();
        assert!((request.estimated_cost.unwrap() - 0.0003).abs() < 1e-9);

        let done = manager.approve_ai(&request.id).await.unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert_eq!(done.cost, Some(0.000055));
        assert_eq!(done.model.as_deref(), Some("mock-1"));
        assert_eq!(done.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(done.dispatch, Some(DispatchPath::Ai));
        assert!(done.duration.is_some());
        assert_eq!(done.response_text().as_deref(), Some("Hi there"));

        let usage = manager.providers().usage("test");
        assert_eq!(usage.total_requests, 1);
        assert_eq!(usage.successful_requests, 1);
        assert!((usage.total_cost - 0.000055).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_validator_failure_is_error_without_retry() {
        let transport = MockTransport::new(vec![Ok(CompletionEnvelope::completed(
            "   ",
            "mock",
            Some("length".to_string()),
            None,
        ))]);
        let manager = manager(Arc::clone(&transport));
        let request = manager.submit(draft()).unwrap();

        let failed = manager.approve_ai(&request.id).await.unwrap();
        assert_eq!(failed.status, RequestStatus::Error);
        assert!(failed.error.as_deref().unwrap().contains("maxTokens"));
        let response = failed.response.unwrap();
        assert!(response.is_error_status());
        assert!(failed.cost.is_none());
        assert_eq!(transport.calls(), 1);

        let usage = manager.providers().usage("test");
        assert_eq!(usage.total_requests, 1);
        assert_eq!(usage.failed_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried() {
        let transport = MockTransport::new(vec![
            Err(SamplingError::provider("test", "503 overloaded")),
            Err(SamplingError::provider("test", "ECONNRESET")),
        ]);
        let manager = manager(Arc::clone(&transport));
        let request = manager.submit(draft()).unwrap();

        let done = manager.approve_ai(&request.id).await.unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert_eq!(transport.calls(), 3);
        assert_eq!(manager.providers().usage("test").total_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_not_retried() {
        let transport = MockTransport::new(vec![Err(SamplingError::provider(
            "test",
            "API error (401 Unauthorized): bad key",
        ))]);
        let manager = manager(Arc::clone(&transport));
        let request = manager.submit(draft()).unwrap();
        let mut events = manager.subscribe();

        let failed = manager.approve_ai(&request.id).await.unwrap();
        assert_eq!(failed.status, RequestStatus::Error);
        assert!(failed.error.as_deref().unwrap().contains("401 Unauthorized"));
        assert_eq!(transport.calls(), 1);

        assert!(matches!(
            events.try_recv().unwrap(),
            LifecycleEvent::RequestApproved { .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            LifecycleEvent::RequestFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_approve_twice_is_invalid() {
        let manager = manager(MockTransport::new(vec![]));
        let request = manager.submit(draft()).unwrap();
        manager.approve_ai(&request.id).await.unwrap();
        assert!(matches!(
            manager.approve_ai(&request.id).await,
            Err(SamplingError::InvalidTransition { .. })
        ));
        assert!(matches!(
            manager.approve_ai(&RequestId::new("missing")).await,
            Err(SamplingError::RequestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_runs_on_task() {
        let manager = Arc::new(manager(MockTransport::new(vec![])));
        let request = manager.submit(draft()).unwrap();

        let handle = manager.dispatch(&request.id).unwrap();
        assert_eq!(
            manager.get(&request.id).unwrap().status,
            RequestStatus::Approved
        );
        let done = handle.await.unwrap().unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
    }

    #[tokio::test]
    async fn test_human_review_stays_pending_until_resolved() {
        let transport = MockTransport::new(vec![]);
        let manager = manager(Arc::clone(&transport));
        let request = manager.submit(draft()).unwrap();

        let waiting = manager.approve_human(&request.id).await.unwrap();
        assert_eq!(waiting.status, RequestStatus::Pending);
        assert_eq!(waiting.dispatch, Some(DispatchPath::Hitl));
        assert_eq!(transport.hitl_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls(), 0);

        let done = manager
            .resolve_manual(
                &request.id,
                Some(CompletionEnvelope::completed("reviewed", "human", None, None)),
            )
            .unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert_eq!(done.dispatch, Some(DispatchPath::Hitl));
        assert!(done.cost.is_none());
    }

    #[tokio::test]
    async fn test_human_review_completed_inline() {
        let transport = MockTransport::new(vec![]);
        *transport.hitl.lock().unwrap() = Some(HitlOutcome {
            status: HitlStatus::Completed,
            response: None,
        });
        let manager = manager(Arc::clone(&transport));
        let request = manager.submit(draft()).unwrap();

        let failed = manager.approve_human(&request.id).await.unwrap();
        assert_eq!(failed.status, RequestStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("empty or null response"));
    }

    #[tokio::test]
    async fn test_human_review_rejected_by_reviewer() {
        let transport = MockTransport::new(vec![]);
        *transport.hitl.lock().unwrap() = Some(HitlOutcome {
            status: HitlStatus::Rejected,
            response: None,
        });
        let manager = manager(Arc::clone(&transport));
        let request = manager.submit(draft()).unwrap();
        let mut events = manager.subscribe();

        let rejected = manager.approve_human(&request.id).await.unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.error.as_deref(), Some(REVIEWER_REJECTED));
        assert!(rejected.response.is_none());
        assert_eq!(transport.hitl_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls(), 0);
        assert_eq!(manager.providers().usage("test").total_requests, 0);
        assert!(matches!(
            events.try_recv().unwrap(),
            LifecycleEvent::RequestRejected { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_human_review_channel_failure_is_error_without_retry() {
        let transport = MockTransport::new(vec![]);
        // Retryable wording, so a retry would show up in hitl_calls
        *transport.hitl_error.lock().unwrap() = Some("ECONNRESET".to_string());
        let manager = manager(Arc::clone(&transport));
        let request = manager.submit(draft()).unwrap();

        let failed = manager.approve_human(&request.id).await.unwrap();
        assert_eq!(failed.status, RequestStatus::Error);
        assert_eq!(failed.dispatch, Some(DispatchPath::Hitl));
        assert!(failed.error.as_deref().unwrap().contains("ECONNRESET"));
        assert!(failed.response.unwrap().is_error_status());
        assert!(failed.cost.is_none());
        assert_eq!(transport.hitl_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls(), 0);

        let usage = manager.providers().usage("test");
        assert_eq!(usage.total_requests, 1);
        assert_eq!(usage.failed_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_retry_backoffs_overlap() {
        let transport = MockTransport::new(vec![
            Err(SamplingError::provider("test", "503 overloaded")),
            Err(SamplingError::provider("test", "503 overloaded")),
        ]);
        let manager = Arc::new(manager(Arc::clone(&transport)).with_retry(RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
        }));
        let first = manager.submit(draft()).unwrap();
        let second = manager.submit(draft()).unwrap();

        let started = Instant::now();
        let a = manager.dispatch(&first.id).unwrap();
        let b = manager.dispatch(&second.id).unwrap();
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        let elapsed = started.elapsed();

        assert_eq!(a.status, RequestStatus::Completed);
        assert_eq!(b.status, RequestStatus::Completed);
        assert_eq!(transport.calls(), 4);
        // One backoff of 1000ms plus under 10% jitter; back to back would be 2000ms+
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1100));
    }

    #[tokio::test]
    async fn test_hybrid_rule_rejects_without_provider_call() {
        let transport = MockTransport::new(vec![]);
        let router = Router::new(
            SamplingMode::Hybrid,
            &[RoutingRule {
                name: "secrets".to_string(),
                enabled: true,
                condition: RuleCondition::SafeContentPattern("(?i)hello".to_string()),
                action: RuleAction::Reject("blocked".to_string()),
            }],
            true,
        )
        .unwrap();
        let manager = manager(Arc::clone(&transport)).with_router(router);
        let request = manager.submit(draft()).unwrap();

        assert_eq!(
            manager.route(&request.id).unwrap(),
            RouteDecision::Reject("blocked".to_string())
        );
        let rejected = manager.auto_route(&request.id).await.unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.error.as_deref(), Some("blocked"));
        assert_eq!(transport.calls(), 0);
        assert_eq!(manager.providers().usage("test").total_requests, 0);
    }

    #[tokio::test]
    async fn test_llm_mode_auto_routes_to_model() {
        let transport = MockTransport::new(vec![]);
        let router = Router::new(SamplingMode::Llm, &[], true).unwrap();
        let manager = manager(Arc::clone(&transport)).with_router(router);
        let request = manager.submit(draft()).unwrap();

        let done = manager.auto_route(&request.id).await.unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let manager = manager(MockTransport::new(vec![])).with_capacity(2);
        let first = manager.submit(draft()).unwrap();
        manager.submit(draft()).unwrap();
        manager.submit(draft()).unwrap();

        assert_eq!(manager.list().len(), 2);
        assert!(manager.get(&first.id).is_none());
        assert_eq!(manager.stats().pending, 2);
    }

    #[test]
    fn test_restore_fails_in_flight_requests() {
        let manager = manager(MockTransport::new(vec![]));
        let mut in_flight = SamplingRequest::from_draft(draft(), 0.0, "test");
        in_flight.status = RequestStatus::Approved;
        let pending = SamplingRequest::from_draft(draft(), 0.0, "test");

        let draft_back = manager.restore(HistorySnapshot {
            requests: vec![in_flight.clone(), pending],
            draft: Some(draft()),
        });

        assert_eq!(draft_back, Some(draft()));
        let restored = manager.get(&in_flight.id).unwrap();
        assert_eq!(restored.status, RequestStatus::Error);
        assert_eq!(restored.error.as_deref(), Some(INTERRUPTED));
        assert_eq!(manager.stats().pending, 1);
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::new(dir.path().join("history.json"));
        let first = manager(MockTransport::new(vec![])).with_history(history.clone());
        let request = first.submit(draft()).unwrap();
        first.approve_ai(&request.id).await.unwrap();
        first.persist(Some(draft())).await.unwrap();

        let second = manager(MockTransport::new(vec![])).with_history(history);
        let restored_draft = second.load_persisted().await;
        assert_eq!(restored_draft, Some(draft()));
        assert_eq!(
            second.get(&request.id).unwrap().status,
            RequestStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried() {
        struct SlowTransport(AtomicU32);

        #[async_trait]
        impl SamplingTransport for SlowTransport {
            async fn invoke_model(&self, _: &ModelInvocation) -> Result<CompletionEnvelope> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(600)).await;
                }
                Ok(CompletionEnvelope::completed("late", "slow", None, None))
            }

            fn name(&self) -> &str {
                "slow"
            }
        }

        let transport = Arc::new(SlowTransport(AtomicU32::new(0)));
        let manager = LifecycleManager::new(transport.clone(), store()).with_timeouts(
            TimeoutConfig {
                model_call: Duration::from_secs(5),
                ..Default::default()
            },
        );
        let request = manager.submit(draft()).unwrap();
        let done = manager.approve_ai(&request.id).await.unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert_eq!(transport.0.load(Ordering::SeqCst), 2);
    }
}
