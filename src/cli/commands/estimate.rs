//! Estimate Command
//!
//! Price a message against a provider without sending it.
//!
//! Usage:
//!   sampling-lab estimate "Hello" [--max-tokens 500] [--provider anthropic] [--thinking high]

use std::time::Duration;

use crate::ai::cost::{FeatureFlags, ReasoningEffort, ThinkingBudget};
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, format_cost};
use crate::sampling::{DraftEstimator, SamplingDraft};
use crate::types::{Result, SamplingError};

pub struct EstimateOptions {
    pub text: String,
    pub max_tokens: Option<u32>,
    pub provider: Option<String>,
    pub effort: ReasoningEffort,
    pub thinking: Option<ThinkingBudget>,
    pub format: String,
}

pub fn run(options: EstimateOptions) -> Result<()> {
    let ctx = CommandContext::load_with_provider(options.provider.as_deref())?;
    let estimator = DraftEstimator::new(
        ctx.providers.clone(),
        Duration::from_millis(ctx.config.sampling.debounce_ms),
        ctx.config.sampling.default_max_tokens,
    );

    let mut draft = SamplingDraft::text("cli", options.text).with_features(FeatureFlags {
        reasoning_effort: options.effort,
        thinking: options.thinking,
    });
    draft.max_tokens = options.max_tokens;

    let estimate = estimator.estimate_now(&draft)?;
    let provider = ctx
        .providers
        .active_provider()
        .ok_or_else(|| SamplingError::Config("No active provider selected".to_string()))?;

    if options.format == "json" {
        let value = serde_json::json!({
            "provider": provider.id,
            "model": provider.model,
            "estimate": estimate,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let out = Output::new();
    out.header("Cost Estimate");
    out.field("Provider", format!("{} ({})", provider.name, provider.family));
    out.field("Model", &provider.model);
    out.field("Input tokens", estimate.input_tokens);
    out.field("Output tokens", estimate.output_tokens);
    if estimate.surcharge > 0.0 {
        out.field("Surcharge", format_cost(estimate.surcharge));
    }
    out.field("Total", format_cost(estimate.total));

    if !provider.is_configured() {
        out.warning(&format!(
            "Provider '{}' is not configured; sending would fail",
            provider.id
        ));
    }
    Ok(())
}
