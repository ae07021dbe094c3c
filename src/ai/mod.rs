//! Model Integration Layer
//!
//! Provider transports, cost estimation, retry/timeout control, response
//! validation and the scheduling primitives the sampling engine runs on.

pub mod cost;
pub mod metrics;
pub mod provider;
pub mod retry;
pub mod schedule;
pub mod timeout;
pub mod validation;

pub use cost::{
    CostEstimate, CostEstimator, FeatureFlags, ReasoningEffort, ThinkingBudget, actual_cost,
};
pub use metrics::{RequestOutcome, UsageTracker, display_stats};
pub use provider::{
    CompletionEnvelope, ConfigRegistry, HitlOutcome, HitlStatus, ModelInvocation, ProviderConfig,
    ProviderRegistry, ProviderStore, SamplingTransport, SharedProviderStore, SharedTransport,
    StopReason, TokenUsage, create_transport,
};
pub use retry::{RetryPolicy, with_retry};
pub use schedule::{Debouncer, ScheduledTask};
pub use timeout::{TimeoutConfig, with_timeout};
pub use validation::{ResponseValidator, ValidationOutcome};
