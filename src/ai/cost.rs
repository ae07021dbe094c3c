//! Cost Estimation
//!
//! Pre-dispatch cost estimate for a draft sampling request, plus actual cost
//! from provider-reported token usage.
//!
//! Estimates are deliberately rough: input tokens are approximated from the
//! character count and the completion is assumed to stay short. The estimate is
//! informational and never gates submission.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ai::provider::TokenUsage;
use crate::constants::cost as cost_constants;
use crate::types::{CostTable, ProviderFamily, SamplingMessage, round_to};

// =============================================================================
// Feature Flags
// =============================================================================

/// Reasoning effort for the reasoning-effort provider family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    #[default]
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    /// Multiplier applied to the output token estimate
    pub fn output_multiplier(&self) -> f64 {
        match self {
            Self::Minimal => 1.0,
            Self::Low => 1.2,
            Self::Medium => 1.5,
            Self::High => 2.0,
        }
    }
}

/// Thinking budget for the extended-thinking provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingBudget {
    Low,
    Medium,
    High,
}

impl ThinkingBudget {
    /// Thinking tokens as a fraction of input tokens
    pub fn fraction(&self) -> f64 {
        match self {
            Self::Low => 0.2,
            Self::Medium => 0.4,
            Self::High => 0.6,
        }
    }

    /// Token budget requested from the provider, never below the API minimum
    pub fn budget_tokens(&self, input_tokens: u32) -> u32 {
        let scaled = (input_tokens as f64 * self.fraction()).ceil() as u32;
        scaled.max(cost_constants::MIN_THINKING_BUDGET_TOKENS)
    }
}

macro_rules! impl_level_parse {
    ($ty:ty, $label:literal, { $($name:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    _ => Err(format!(
                        "Invalid {} '{}'. Valid values: {}",
                        $label,
                        s,
                        [$($name),+].join(", ")
                    )),
                }
            }
        }
    };
}

impl_level_parse!(ReasoningEffort, "reasoning effort", {
    "minimal" => ReasoningEffort::Minimal,
    "low" => ReasoningEffort::Low,
    "medium" => ReasoningEffort::Medium,
    "high" => ReasoningEffort::High,
});

impl_level_parse!(ThinkingBudget, "thinking budget", {
    "low" => ThinkingBudget::Low,
    "medium" => ThinkingBudget::Medium,
    "high" => ThinkingBudget::High,
});

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// Per-request feature toggles.
///
/// They raise the estimate and are sent to the provider: reasoning effort as
/// `reasoning_effort` on the OpenAI family, thinking as an Anthropic
/// `thinking` budget. Other families ignore them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFlags {
    pub reasoning_effort: ReasoningEffort,
    /// `None` disables extended thinking
    pub thinking: Option<ThinkingBudget>,
}

// =============================================================================
// Estimator
// =============================================================================

/// Estimate breakdown
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    /// Base plus surcharge, rounded to 4 decimals
    pub total: f64,
    /// Feature surcharge alone
    pub surcharge: f64,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Cost estimator bound to one provider's family and pricing
#[derive(Debug, Clone)]
pub struct CostEstimator {
    family: ProviderFamily,
    table: CostTable,
}

impl CostEstimator {
    pub fn new(family: ProviderFamily, table: CostTable) -> Self {
        Self { family, table }
    }

    /// `ceil(chars / 4)` over the text of every message
    pub fn input_tokens(messages: &[SamplingMessage]) -> u32 {
        let chars: usize = messages
            .iter()
            .filter_map(|m| m.text())
            .map(|t| t.chars().count())
            .sum();
        chars.div_ceil(cost_constants::CHARS_PER_TOKEN) as u32
    }

    pub fn output_tokens(max_tokens: u32) -> u32 {
        max_tokens.min(cost_constants::ASSUMED_OUTPUT_TOKENS)
    }

    pub fn estimate(
        &self,
        messages: &[SamplingMessage],
        max_tokens: u32,
        flags: &FeatureFlags,
    ) -> CostEstimate {
        let input_tokens = Self::input_tokens(messages);
        let output_tokens = Self::output_tokens(max_tokens);

        let input_cost = per_1k(input_tokens as f64, self.table.input_cost_per_1k);
        let output_cost = per_1k(output_tokens as f64, self.table.output_cost_per_1k);
        let surcharge = self.surcharge(input_tokens, output_tokens, flags);

        CostEstimate {
            total: round_to(input_cost + output_cost + surcharge, cost_constants::ESTIMATE_PRECISION),
            surcharge: round_to(surcharge, cost_constants::ACTUAL_PRECISION),
            input_tokens,
            output_tokens,
        }
    }

    fn surcharge(&self, input_tokens: u32, output_tokens: u32, flags: &FeatureFlags) -> f64 {
        let surcharge = match self.family {
            ProviderFamily::OpenAi if flags.reasoning_effort != ReasoningEffort::Minimal => {
                let boosted = output_tokens as f64 * flags.reasoning_effort.output_multiplier();
                per_1k(boosted, self.table.output_cost_per_1k)
                    - per_1k(output_tokens as f64, self.table.output_cost_per_1k)
            }
            ProviderFamily::Anthropic => match (flags.thinking, self.table.thinking_cost_per_1k) {
                (Some(budget), Some(price)) => {
                    per_1k(input_tokens as f64 * budget.fraction(), price)
                }
                _ => 0.0,
            },
            _ => 0.0,
        };
        surcharge.max(0.0)
    }
}

/// Actual cost from provider-reported usage
pub fn actual_cost(usage: &TokenUsage, table: &CostTable) -> f64 {
    let thinking = match (usage.thinking_tokens, table.thinking_cost_per_1k) {
        (Some(tokens), Some(price)) => per_1k(tokens as f64, price),
        _ => 0.0,
    };
    let cost = per_1k(usage.input_tokens as f64, table.input_cost_per_1k)
        + per_1k(usage.output_tokens as f64, table.output_cost_per_1k)
        + thinking;
    round_to(cost.max(0.0), cost_constants::ACTUAL_PRECISION)
}

#[inline]
fn per_1k(tokens: f64, price: f64) -> f64 {
    tokens / 1000.0 * price
}
