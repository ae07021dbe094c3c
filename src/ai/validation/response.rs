//! Response Validation
//!
//! Rules, first match wins:
//! 1. absent result
//! 2. `status == "error"`
//! 3. empty extracted text (reason names truncation when the stop reason says so)
//! 4. otherwise valid

use serde::Serialize;

use crate::ai::provider::CompletionEnvelope;

const EMPTY_RESPONSE: &str = "empty or null response";
const ERROR_STATUS: &str = "provider returned error status";

/// Validation verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Stateless completion validator
pub struct ResponseValidator;

impl ResponseValidator {
    pub fn validate(result: Option<&CompletionEnvelope>) -> ValidationOutcome {
        let Some(envelope) = result else {
            return ValidationOutcome::invalid(EMPTY_RESPONSE);
        };

        if envelope.is_error_status() {
            let reason = envelope
                .message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(ERROR_STATUS);
            return ValidationOutcome::invalid(reason);
        }

        if envelope.extracted_text().trim().is_empty() {
            let truncated = matches!(
                envelope.stop_reason.as_deref(),
                Some("length") | Some("max_tokens")
            );
            return ValidationOutcome::invalid(Self::empty_content_reason(truncated));
        }

        ValidationOutcome::valid()
    }

    fn empty_content_reason(truncated: bool) -> String {
        let lead = if truncated {
            "Completion was truncated before producing any content"
        } else {
            "Provider returned an empty completion"
        };
        format!(
            "{}. This usually means maxTokens is too small or the system prompt is too long; \
             increase maxTokens or shorten the system prompt.",
            lead
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: serde_json::Value) -> CompletionEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_absent_is_invalid() {
        let outcome = ResponseValidator::validate(None);
        assert!(!outcome.valid);
        assert_eq!(outcome.reason.as_deref(), Some("empty or null response"));
    }

    #[test]
    fn test_error_status_uses_message() {
        let result = envelope(json!({"status": "error", "message": "x"}));
        assert_eq!(
            ResponseValidator::validate(Some(&result)),
            ValidationOutcome::invalid("x")
        );

        let bare = envelope(json!({"status": "error"}));
        assert_eq!(
            ResponseValidator::validate(Some(&bare)).reason.as_deref(),
            Some("provider returned error status")
        );
    }

    #[test]
    fn test_whitespace_content_is_invalid() {
        let result = envelope(json!({"content": "  "}));
        let outcome = ResponseValidator::validate(Some(&result));
        assert!(!outcome.valid);
        assert!(outcome.reason.unwrap().contains("maxTokens"));
    }

    #[test]
    fn test_text_content_is_valid() {
        let result = envelope(json!({"content": "ok"}));
        assert!(ResponseValidator::validate(Some(&result)).valid);

        let text_only = envelope(json!({"text": "ok"}));
        assert!(ResponseValidator::validate(Some(&text_only)).valid);

        let blocks = envelope(json!({"content": [{"type": "text", "text": "ok"}]}));
        assert!(ResponseValidator::validate(Some(&blocks)).valid);
    }

    #[test]
    fn test_truncated_empty_completion() {
        let result = envelope(json!({"content": "", "stop_reason": "length"}));
        let reason = ResponseValidator::validate(Some(&result)).reason.unwrap();
        assert!(reason.contains("truncated"));
        assert!(reason.contains("system prompt"));
    }

    #[test]
    fn test_length_with_content_is_valid() {
        let result = envelope(json!({"content": "partial answer", "stop_reason": "length"}));
        assert!(ResponseValidator::validate(Some(&result)).valid);
    }
}
