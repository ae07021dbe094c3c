//! Unified Error Type System
//!
//! Centralized error types for the sampling engine.
//!
//! ## Error Categories
//!
//! - **Auth / BadRequest / NotFound**: terminal, retrying cannot succeed without user action
//! - **RateLimit / Network / Timeout / Transient**: retried with backoff
//! - **Unknown**: presumed transient
//!
//! Retry decisions go through [`ErrorClassifier::is_non_retryable`]. Categories
//! exist for log fields and CLI display.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories used for display and log routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or missing credentials
    Auth,
    /// Malformed request or invalid parameter
    BadRequest,
    /// Unknown model, endpoint, or resource
    NotFound,
    /// Provider rate limiting
    RateLimit,
    /// Connectivity issues
    Network,
    /// Operation exceeded its deadline
    Timeout,
    /// Temporary server-side failure
    Transient,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "AUTH"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Network => write!(f, "NETWORK"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Whether another attempt could succeed without user intervention
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Auth | Self::BadRequest | Self::NotFound)
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Substrings that mark an error as terminal (matched case-insensitively)
const NON_RETRYABLE_PATTERNS: &[&str] = &["api key", "unauthorized", "invalid", "not found"];

/// Error classifier for retry decisions
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// True when the stringified error names a condition retrying cannot fix:
    /// bad credentials, a malformed request, or an unknown resource.
    pub fn is_non_retryable(message: &str) -> bool {
        let lower = message.to_lowercase();
        NON_RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
    }

    /// Classify an error message into a display category.
    ///
    /// Terminal patterns are checked first so the category never disagrees
    /// with [`Self::is_non_retryable`].
    pub fn classify(message: &str) -> ErrorCategory {
        let lower = message.to_lowercase();

        if Self::is_non_retryable(message) {
            return if lower.contains("not found") {
                ErrorCategory::NotFound
            } else if lower.contains("api key") || lower.contains("unauthorized") {
                ErrorCategory::Auth
            } else {
                ErrorCategory::BadRequest
            };
        }

        if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests")
        {
            return ErrorCategory::RateLimit;
        }

        if lower.contains("timeout") || lower.contains("timed out") {
            return ErrorCategory::Timeout;
        }

        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("econnreset")
            || lower.contains("econnrefused")
            || lower.contains("dns")
        {
            return ErrorCategory::Network;
        }

        if lower.contains("overloaded")
            || lower.contains("temporar")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("500")
        {
            return ErrorCategory::Transient;
        }

        ErrorCategory::Unknown
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Failure reported by a provider, original message preserved
    #[error("{provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Request {id}: cannot apply {event} while {from}")]
    InvalidTransition {
        id: String,
        from: String,
        event: String,
    },

    #[error("Request not found: {0}")]
    RequestNotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, SamplingError>;

impl SamplingError {
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Category of this error, derived from its message
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Config(_) => ErrorCategory::BadRequest,
            Self::RequestNotFound(_) => ErrorCategory::NotFound,
            other => ErrorClassifier::classify(&other.to_string()),
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| SamplingError::Storage(format!("{}: {}", context.into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_retryable_patterns() {
        assert!(ErrorClassifier::is_non_retryable("401 Unauthorized"));
        assert!(ErrorClassifier::is_non_retryable("Missing API key"));
        assert!(ErrorClassifier::is_non_retryable("invalid_request_error: bad temperature"));
        assert!(ErrorClassifier::is_non_retryable("model gpt-9 Not Found"));
    }

    #[test]
    fn test_transient_errors_retryable() {
        assert!(!ErrorClassifier::is_non_retryable("ECONNRESET"));
        assert!(!ErrorClassifier::is_non_retryable("503 Service Unavailable"));
        assert!(!ErrorClassifier::is_non_retryable("rate limit exceeded"));
        assert!(!ErrorClassifier::is_non_retryable(""));
    }

    #[test]
    fn test_classify_categories() {
        assert_eq!(ErrorClassifier::classify("401 Unauthorized"), ErrorCategory::Auth);
        assert_eq!(ErrorClassifier::classify("Invalid API key"), ErrorCategory::Auth);
        assert_eq!(
            ErrorClassifier::classify("model not found"),
            ErrorCategory::NotFound
        );
        assert_eq!(
            ErrorClassifier::classify("invalid max_tokens"),
            ErrorCategory::BadRequest
        );
        assert_eq!(
            ErrorClassifier::classify("429 Too Many Requests"),
            ErrorCategory::RateLimit
        );
        assert_eq!(ErrorClassifier::classify("ECONNRESET"), ErrorCategory::Network);
        assert_eq!(
            ErrorClassifier::classify("request timed out"),
            ErrorCategory::Timeout
        );
        assert_eq!(
            ErrorClassifier::classify("server overloaded"),
            ErrorCategory::Transient
        );
        assert_eq!(ErrorClassifier::classify("boom"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_category_agrees_with_predicate() {
        for msg in [
            "401 Unauthorized",
            "invalid request",
            "not found",
            "ECONNRESET",
            "429",
            "timeout",
        ] {
            assert_eq!(
                ErrorClassifier::classify(msg).is_retryable(),
                !ErrorClassifier::is_non_retryable(msg),
                "mismatch for {msg}"
            );
        }
    }

    #[test]
    fn test_provider_error_keeps_message() {
        let err = SamplingError::provider("openai", "OpenAI API error (401): Incorrect API key");
        assert!(err.to_string().contains("Incorrect API key"));
        assert_eq!(err.category(), ErrorCategory::Auth);
    }

    #[test]
    fn test_timeout_category() {
        let err = SamplingError::timeout("model call", Duration::from_secs(5));
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert!(err.to_string().contains("model call"));
    }
}
