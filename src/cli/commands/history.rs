//! History Command
//!
//! Show or clear the persisted request history.

use crate::cli::ui::{Output, status_label};
use crate::cli::util::{CommandContext, format_cost, short_id};
use crate::sampling::RequestStats;
use crate::types::Result;

pub async fn run(format: &str, limit: usize, clear: bool) -> Result<()> {
    let ctx = CommandContext::load()?;
    let store = ctx.history_store();
    let out = Output::new();

    if clear {
        if store.clear().await? {
            out.success(&format!("Cleared {}", store.path().display()));
        } else {
            out.info("No history to clear");
        }
        return Ok(());
    }

    let snapshot = store.load().await;
    let stats = RequestStats::from_requests(&snapshot.requests);
    let shown: Vec<_> = snapshot.requests.iter().take(limit).collect();

    if format == "json" {
        let value = serde_json::json!({
            "stats": stats,
            "requests": shown,
            "draft": snapshot.draft,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if snapshot.requests.is_empty() {
        out.info("No requests recorded yet");
        return Ok(());
    }

    out.header("Request History");
    for request in &shown {
        let cost = request
            .cost
            .or(request.estimated_cost)
            .map(format_cost)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {:<10} {:<12} {:>10}  {}",
            short_id(request.id.as_str()),
            request.created_at.format("%Y-%m-%d %H:%M"),
            status_label(request.status),
            request.server_name,
            cost,
            request.preview()
        );
        if let Some(error) = &request.error {
            out.field("Error", error);
        }
    }

    out.section("Summary");
    out.field("Total", stats.total);
    out.field("Completed", stats.completed);
    out.field("Pending", stats.pending);
    out.field("Rejected", stats.rejected);
    out.field("Errors", stats.error);
    out.field("Spent", format_cost(stats.total_cost));
    if snapshot.draft.is_some() {
        out.info("A saved draft is present");
    }
    Ok(())
}
