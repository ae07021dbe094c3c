//! Timeout helpers
//!
//! Bounds individual provider attempts so a hung connection surfaces as a
//! retryable `SamplingError::Timeout` instead of stalling the retry loop.
//!
//! ```ignore
//! let envelope = with_timeout(
//!     Duration::from_secs(120),
//!     transport.invoke_model(&invocation),
//!     "model call",
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::config::SamplingConfig;
use crate::constants::network as net_constants;
use crate::types::{Result, SamplingError};

/// Timeouts applied to provider operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Single model call attempt or human review hand-off (default: 120 seconds)
    pub model_call: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            model_call: Duration::from_secs(net_constants::REQUEST_TIMEOUT_SECS),
        }
    }
}

impl From<&SamplingConfig> for TimeoutConfig {
    fn from(config: &SamplingConfig) -> Self {
        Self {
            model_call: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Execute an async operation with a timeout
///
/// Returns a timeout error if the operation doesn't complete within the specified duration.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(SamplingError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorClassifier;

    #[test]
    fn test_timeout_config_defaults() {
        let config = TimeoutConfig::default();
        assert_eq!(config.model_call.as_secs(), 120);
    }

    #[test]
    fn test_timeout_config_from_sampling() {
        let sampling = SamplingConfig {
            request_timeout_secs: 5,
            ..Default::default()
        };
        assert_eq!(TimeoutConfig::from(&sampling).model_call.as_secs(), 5);
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, SamplingError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires_and_is_retryable() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, SamplingError>(42)
            },
            "slow operation",
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, SamplingError::Timeout { .. }));
        assert!(!ErrorClassifier::is_non_retryable(&err.to_string()));
    }
}
