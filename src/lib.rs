//! sampling-lab - Sampling Request Lifecycle Engine
//!
//! Estimates, routes, executes and tracks LLM sampling requests issued on
//! behalf of tool servers. A request is either sent to a model through a
//! provider transport or handed to a human reviewer, and always ends in a
//! terminal state with its cost and usage recorded.
//!
//! ## Quick Start
//!
//! ```ignore
//! use sampling_lab::{Config, LifecycleManager, ProviderStore, SamplingDraft, create_transport};
//!
//! let config = Config::default();
//! let providers = Arc::new(ProviderStore::from_config(&config));
//! let transport = create_transport(&providers.require_active()?, 120)?;
//! let manager = LifecycleManager::from_config(&config, transport, providers)?;
//!
//! let pending = manager.submit(SamplingDraft::text("fs", "Hello"))?;
//! let done = manager.approve_ai(&pending.id).await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: transports, cost estimation, retry/timeout, response validation
//! - [`sampling`]: request lifecycle, routing, history persistence
//! - [`config`]: layered configuration
//! - [`cli`]: command implementations for the binary

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod sampling;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{Config, ConfigLoader, SamplingConfig};
pub use types::error::{ErrorCategory, Result, ResultExt, SamplingError};

pub use ai::{
    CompletionEnvelope, CostEstimate, CostEstimator, FeatureFlags, ProviderConfig,
    ProviderRegistry, ProviderStore, SamplingTransport, SharedProviderStore, SharedTransport,
    create_transport,
};

pub use sampling::{
    DraftEstimator, HistoryStore, LifecycleEvent, LifecycleManager, RequestStatus, RequestStats,
    SamplingDraft, SamplingMode, SamplingRequest,
};
