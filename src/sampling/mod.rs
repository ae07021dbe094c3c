//! Sampling Request Lifecycle
//!
//! Turns a composed draft into a request, routes it to the model or a human
//! reviewer, and tracks it to a terminal state.
//!
//! ## Modules
//!
//! - `state`: status enum and the pure transition function
//! - `request`: request and draft types
//! - `routing`: manual/llm/hybrid dispatch rules
//! - `manager`: the lifecycle manager
//! - `history`: persisted snapshot of recent requests
//! - `draft`: debounced cost estimation while composing

pub mod draft;
pub mod history;
pub mod manager;
pub mod request;
pub mod routing;
pub mod state;

pub use draft::DraftEstimator;
pub use history::{HistorySnapshot, HistoryStore};
pub use manager::{LifecycleEvent, LifecycleManager, RequestStats};
pub use request::{DispatchPath, SamplingDraft, SamplingRequest};
pub use routing::{RouteDecision, Router, RoutingRule, RuleAction, RuleCondition, SamplingMode};
pub use state::{RequestStatus, StatusEvent, transition};
