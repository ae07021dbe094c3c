//! Stop reason normalization
//!
//! Providers report why generation ended with their own vocabulary. Requests
//! store one normalized value so history and validation treat every provider
//! alike.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::types::ProviderFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural completion
    EndTurn,
    /// Token budget reached
    MaxTokens,
    /// A configured stop sequence matched
    StopSequence,
    /// Content policy triggered
    ContentFilter,
    /// Tool or function call requested
    ToolUse,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::StopSequence => "stop_sequence",
            Self::ContentFilter => "content_filter",
            Self::ToolUse => "tool_use",
        }
    }

    /// Map a provider-specific value; unknown values fall back to keyword matching
    pub fn from_provider(family: ProviderFamily, raw: &str) -> Self {
        let mapped = match family {
            ProviderFamily::OpenAi => match raw {
                "stop" => Some(Self::EndTurn),
                "length" => Some(Self::MaxTokens),
                "content_filter" => Some(Self::ContentFilter),
                "tool_calls" | "function_call" => Some(Self::ToolUse),
                _ => None,
            },
            ProviderFamily::Anthropic => match raw {
                "end_turn" => Some(Self::EndTurn),
                "max_tokens" => Some(Self::MaxTokens),
                "stop_sequence" => Some(Self::StopSequence),
                "tool_use" => Some(Self::ToolUse),
                _ => None,
            },
            ProviderFamily::Local => match raw {
                "stop" | "end" => Some(Self::EndTurn),
                "length" | "max_tokens" => Some(Self::MaxTokens),
                "stop_sequence" => Some(Self::StopSequence),
                "tool_calls" => Some(Self::ToolUse),
                _ => None,
            },
        };

        match mapped {
            Some(reason) => {
                debug!(provider = %family, raw, mapped = reason.as_str(), "Stop reason mapped");
                reason
            }
            None => Self::heuristic(raw),
        }
    }

    fn heuristic(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("sequence") {
            Self::StopSequence
        } else if lower.contains("length") || lower.contains("token") || lower.contains("max") {
            Self::MaxTokens
        } else if lower.contains("filter") || lower.contains("safety") {
            Self::ContentFilter
        } else if lower.contains("tool") || lower.contains("function") {
            Self::ToolUse
        } else {
            if !(lower.contains("stop") || lower.contains("end") || lower.contains("complete")) {
                warn!(raw, "Unrecognized stop reason, treating as end_turn");
            }
            Self::EndTurn
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_mapping() {
        use ProviderFamily::OpenAi;
        assert_eq!(StopReason::from_provider(OpenAi, "stop"), StopReason::EndTurn);
        assert_eq!(StopReason::from_provider(OpenAi, "length"), StopReason::MaxTokens);
        assert_eq!(
            StopReason::from_provider(OpenAi, "content_filter"),
            StopReason::ContentFilter
        );
        assert_eq!(
            StopReason::from_provider(OpenAi, "function_call"),
            StopReason::ToolUse
        );
    }

    #[test]
    fn test_anthropic_mapping() {
        use ProviderFamily::Anthropic;
        assert_eq!(StopReason::from_provider(Anthropic, "end_turn"), StopReason::EndTurn);
        assert_eq!(
            StopReason::from_provider(Anthropic, "max_tokens"),
            StopReason::MaxTokens
        );
        assert_eq!(
            StopReason::from_provider(Anthropic, "stop_sequence"),
            StopReason::StopSequence
        );
        assert_eq!(StopReason::from_provider(Anthropic, "tool_use"), StopReason::ToolUse);
    }

    #[test]
    fn test_heuristic_fallback() {
        use ProviderFamily::Local;
        assert_eq!(
            StopReason::from_provider(Local, "MAX_OUTPUT_TOKENS"),
            StopReason::MaxTokens
        );
        assert_eq!(StopReason::from_provider(Local, "SAFETY"), StopReason::ContentFilter);
        assert_eq!(StopReason::from_provider(Local, "weird"), StopReason::EndTurn);
    }

    #[test]
    fn test_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&StopReason::MaxTokens).unwrap(),
            "\"max_tokens\""
        );
        assert_eq!(StopReason::ToolUse.to_string(), "tool_use");
    }
}
