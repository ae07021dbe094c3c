//! Providers Command
//!
//! List configured providers, their status and session usage.

use crate::ai::provider::ProviderRegistry;
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, format_cost};
use crate::types::Result;

pub async fn run(format: &str, with_models: bool) -> Result<()> {
    let ctx = CommandContext::load()?;
    let registry = ctx.registry()?;
    ctx.providers.refresh(&registry).await?;

    let statuses = ctx.providers.statuses();
    let active = ctx.providers.active_provider().map(|p| p.id);

    let mut models = Vec::with_capacity(statuses.len());
    for status in &statuses {
        let listed = if with_models {
            match ctx.config.provider(&status.id) {
                Some(provider) => {
                    match registry.fetch_available_models(&provider.effective_base_url()).await {
                        Ok(ids) => Some(ids),
                        Err(e) => {
                            tracing::warn!(provider = %status.id, error = %e, "Model listing failed");
                            None
                        }
                    }
                }
                None => None,
            }
        } else {
            None
        };
        models.push(listed);
    }

    if format == "json" {
        let entries: Vec<_> = statuses
            .iter()
            .zip(&models)
            .map(|(status, models)| {
                serde_json::json!({
                    "status": status,
                    "active": active.as_deref() == Some(status.id.as_str()),
                    "models": models,
                })
            })
            .collect();
        let value = serde_json::json!({
            "activeProvider": active,
            "samplingAvailable": ctx.providers.is_sampling_available(),
            "providers": entries,
            "issues": ctx.providers.configuration_issues(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let out = Output::new();
    out.header("Providers");
    for (status, models) in statuses.iter().zip(&models) {
        let marker = if active.as_deref() == Some(status.id.as_str()) {
            "*"
        } else {
            " "
        };
        let state = match (status.enabled, status.configured) {
            (false, _) => console::style("disabled").dim(),
            (true, false) => console::style("no key").yellow(),
            (true, true) => console::style("ready").green(),
        };
        println!(
            "{} {:<12} {:<10} {:<24} {}",
            marker, status.id, status.family, status.default_model, state
        );
        out.field(
            "Pricing",
            format!(
                "{} in / {} out per 1k",
                format_cost(status.cost.input_cost_per_1k),
                format_cost(status.cost.output_cost_per_1k)
            ),
        );
        if status.usage.total_requests > 0 {
            out.field(
                "Usage",
                format!(
                    "{} requests, {:.0}% ok, {}",
                    status.usage.total_requests,
                    status.usage.success_rate() * 100.0,
                    format_cost(status.usage.total_cost)
                ),
            );
        }
        if let Some(models) = models {
            out.field("Models", models.join(", "));
        }
    }

    let issues = ctx.providers.configuration_issues();
    if issues.is_empty() {
        println!();
        out.success("Sampling available");
    } else {
        println!();
        for issue in &issues {
            out.warning(issue);
        }
    }
    Ok(())
}
