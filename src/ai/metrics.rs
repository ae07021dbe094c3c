//! Provider Usage Tracking
//!
//! Cumulative per-provider counters updated once per terminal request outcome.
//! Thread-safe for concurrent request tasks; counters never decrease.
//!
//! ## Usage
//!
//! ```ignore
//! let tracker = UsageTracker::new();
//! tracker.record(&RequestOutcome::success(850, Some(usage), Some(0.0012)));
//! let stats = tracker.snapshot();
//! ```

use chrono::{DateTime, Utc};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ai::provider::TokenUsage;
use crate::types::UsageStats;

// =============================================================================
// Request Outcome
// =============================================================================

/// What the lifecycle manager reports when a request reaches a terminal state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestOutcome {
    pub success: bool,
    pub duration_ms: u64,
    pub usage: Option<TokenUsage>,
    pub cost: Option<f64>,
}

impl RequestOutcome {
    pub fn success(duration_ms: u64, usage: Option<TokenUsage>, cost: Option<f64>) -> Self {
        Self {
            success: true,
            duration_ms,
            usage,
            cost,
        }
    }

    pub fn failure(duration_ms: u64) -> Self {
        Self {
            success: false,
            duration_ms,
            usage: None,
            cost: None,
        }
    }
}

// =============================================================================
// Usage Tracker
// =============================================================================

/// Thread-safe usage counters for one provider.
///
/// Uses atomic operations for counters and RwLock for the last-request timestamp.
#[derive(Debug, Default)]
pub struct UsageTracker {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    total_latency_ms: AtomicU64,
    /// Total cost (stored as microdollars for atomic ops)
    total_cost_micros: AtomicU64,
    last_request_at: RwLock<Option<DateTime<Utc>>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one terminal outcome
    pub fn record(&self, outcome: &RequestOutcome) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if outcome.success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms
            .fetch_add(outcome.duration_ms, Ordering::Relaxed);

        if let Some(usage) = outcome.usage {
            self.input_tokens
                .fetch_add(usage.input_tokens as u64, Ordering::Relaxed);
            self.output_tokens
                .fetch_add(usage.output_tokens as u64, Ordering::Relaxed);
        }

        if let Some(cost) = outcome.cost.filter(|c| c.is_finite() && *c > 0.0) {
            let cost_micros = (cost * 1_000_000.0).round() as u64;
            self.total_cost_micros
                .fetch_add(cost_micros, Ordering::Relaxed);
        }

        let mut last = self.last_request_at.write().unwrap_or_else(|poisoned| {
            tracing::error!("Usage last_request_at RwLock poisoned, recovering");
            poisoned.into_inner()
        });
        *last = Some(Utc::now());
    }

    /// Get current usage snapshot
    pub fn snapshot(&self) -> UsageStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let average_response_time_ms = if total_requests > 0 {
            total_latency as f64 / total_requests as f64
        } else {
            0.0
        };

        let last_request_at = *self.last_request_at.read().unwrap_or_else(|poisoned| {
            tracing::error!("Usage last_request_at RwLock poisoned on read, recovering");
            poisoned.into_inner()
        });

        UsageStats {
            total_requests,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            total_input_tokens: self.input_tokens.load(Ordering::Relaxed),
            total_output_tokens: self.output_tokens.load(Ordering::Relaxed),
            total_cost: self.total_cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            average_response_time_ms,
            last_request_at,
        }
    }
}

/// Format usage stats for display
pub fn display_stats(stats: &UsageStats) -> String {
    format!(
        "Requests: {} (ok: {}, failed: {})\n\
         Tokens: {} in / {} out\n\
         Avg Latency: {:.0}ms\n\
         Total Cost: ${:.6}",
        stats.total_requests,
        stats.successful_requests,
        stats.failed_requests,
        stats.total_input_tokens,
        stats.total_output_tokens,
        stats.average_response_time_ms,
        stats.total_cost
    )
}

// =============================================================================
// Tests
// =============================================================================
