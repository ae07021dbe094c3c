//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Retry controller constants
pub mod retry {
    /// Default maximum retries after the first attempt
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const INITIAL_DELAY_MS: u64 = 1000;

    /// Jitter upper bound as a fraction of the computed delay
    pub const JITTER_RATIO: f64 = 0.1;
}

/// Cost estimation constants
pub mod cost {
    /// Approximate characters per token
    pub const CHARS_PER_TOKEN: usize = 4;

    /// Conservative completion-length assumption (tokens)
    pub const ASSUMED_OUTPUT_TOKENS: u32 = 150;

    /// Decimal places kept in estimates
    pub const ESTIMATE_PRECISION: i32 = 4;

    /// Decimal places kept in actual (usage-based) costs
    pub const ACTUAL_PRECISION: i32 = 6;

    /// Smallest thinking budget the extended-thinking API accepts
    pub const MIN_THINKING_BUDGET_TOKENS: u32 = 1024;
}

/// Sampling defaults
pub mod sampling {
    /// Completion budget when a draft leaves `maxTokens` unset
    pub const DEFAULT_MAX_TOKENS: u32 = 1000;

    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Quiet period before a draft estimate is recomputed (milliseconds)
    pub const DEBOUNCE_MS: u64 = 300;

    /// Preview length for notifications and history listings
    pub const PREVIEW_CHARS: usize = 100;

    /// Capacity of the lifecycle event channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 100;
}

/// Request history limits
pub mod history {
    /// Requests kept in memory
    pub const MAX_IN_MEMORY: usize = 20;

    /// Requests written to the persisted snapshot
    pub const MAX_PERSISTED: usize = 50;

    pub const FILE_NAME: &str = "history.json";
}

/// Network and provider refresh settings
pub mod network {
    /// Per-attempt provider call timeout (seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;

    /// Provider status refresh period (seconds)
    pub const REFRESH_INTERVAL_SECS: u64 = 30;

    /// Timeout for model listing calls (seconds)
    pub const MODEL_LIST_TIMEOUT_SECS: u64 = 10;
}
