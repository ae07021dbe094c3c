//! Send Command
//!
//! Submit a sampling request and follow it to a terminal state.
//!
//! Usage:
//!   sampling-lab send "Summarize this" [--system ..] [--max-tokens 500] [--route]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::ai::cost::{FeatureFlags, ReasoningEffort, ThinkingBudget};
use crate::ai::metrics::display_stats;
use crate::cli::ui::{Output, status_label};
use crate::cli::util::{CommandContext, format_cost, short_id};
use crate::sampling::{DispatchPath, LifecycleEvent, RequestStatus, SamplingDraft, SamplingRequest};
use crate::types::{Result, SamplingError};

pub struct SendOptions {
    pub text: String,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub server: String,
    pub provider: Option<String>,
    pub effort: ReasoningEffort,
    pub thinking: Option<ThinkingBudget>,
    /// Follow the configured sampling mode instead of approving for the model
    pub route: bool,
    pub format: String,
}

pub async fn run(options: SendOptions) -> Result<()> {
    let ctx = CommandContext::load_with_provider(options.provider.as_deref())?;
    let manager = ctx.manager()?;
    let _refresh = ctx.providers.spawn_refresh(
        Arc::new(ctx.registry()?),
        Duration::from_secs(ctx.config.sampling.refresh_interval_secs),
    );
    let saved_draft = manager.load_persisted().await;

    let json_output = options.format == "json";
    let events = (!json_output).then(|| tokio::spawn(print_events(manager.subscribe())));

    let mut draft = SamplingDraft::text(options.server, options.text).with_features(FeatureFlags {
        reasoning_effort: options.effort,
        thinking: options.thinking,
    });
    if let Some(system) = options.system {
        draft = draft.with_system_prompt(system);
    }
    if let Some(temperature) = options.temperature {
        draft = draft.with_temperature(temperature);
    }
    draft.max_tokens = options.max_tokens;

    let pending = manager.submit(draft)?;
    let result = if options.route {
        manager.auto_route(&pending.id).await?
    } else {
        manager.approve_ai(&pending.id).await?
    };

    if let Err(e) = manager.persist(saved_draft).await {
        tracing::warn!(error = %e, "Failed to persist request history");
    }
    if let Some(handle) = events {
        handle.abort();
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&ctx, &result);
    }

    match result.status {
        RequestStatus::Error => Err(SamplingError::Provider {
            provider: result.provider_id.unwrap_or_else(|| "unknown".to_string()),
            message: result.error.unwrap_or_else(|| "Request failed".to_string()),
        }),
        _ => Ok(()),
    }
}

async fn print_events(mut rx: tokio::sync::broadcast::Receiver<LifecycleEvent>) {
    let out = Output::new();
    loop {
        match rx.recv().await {
            Ok(event) => {
                let id = short_id(event.id().as_str()).to_string();
                match event {
                    LifecycleEvent::RequestPending { server_name, .. } => {
                        out.info(&format!("{} pending from {}", id, server_name))
                    }
                    LifecycleEvent::RequestApproved { dispatch, .. } => {
                        out.info(&format!("{} approved ({})", id, dispatch))
                    }
                    // Terminal states are printed with the result
                    _ => {}
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_result(ctx: &CommandContext, request: &SamplingRequest) {
    let out = Output::new();
    out.header("Sampling Request");
    out.field("Id", request.id.as_str());
    out.field("Status", status_label(request.status));
    if let Some(provider) = &request.provider_id {
        out.field("Provider", provider);
    }
    if let Some(model) = &request.model {
        out.field("Model", model);
    }
    if let Some(reason) = &request.stop_reason {
        out.field("Stop reason", reason);
    }
    if let Some(duration) = request.duration {
        out.field("Duration", format!("{}ms", duration));
    }
    if let Some(estimated) = request.estimated_cost {
        out.field("Estimated", format_cost(estimated));
    }
    if let Some(cost) = request.cost {
        out.field("Cost", format_cost(cost));
    }

    match request.status {
        RequestStatus::Completed => {
            if let Some(text) = request.response_text() {
                out.section("Response");
                out.block(&text);
            }
        }
        RequestStatus::Pending if request.dispatch == Some(DispatchPath::Hitl) => {
            out.warning("Awaiting human review; the request stays pending");
        }
        RequestStatus::Rejected => {
            out.warning(request.error.as_deref().unwrap_or("Rejected"));
        }
        RequestStatus::Error => {
            out.error(request.error.as_deref().unwrap_or("Request failed"));
        }
        _ => {}
    }

    if let Some(provider) = &request.provider_id {
        out.section("Provider Usage");
        out.block(&display_stats(&ctx.providers.usage(provider)));
    }
}
