//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for text mode.

use crate::metrics;
use crate::model::{CampaignSummary, LifecycleState};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary of a finished or stopped campaign.
pub(crate) fn build_text_summary(summary: &CampaignSummary) -> TextSummary {
    let mut lines = Vec::new();

    if let Some(campaign) = summary.campaign.as_ref() {
        lines.push(format!("Campaign: {}", campaign.id));
        lines.push(format!("Query: {}", campaign.query.trim()));
    }
    let outcome = match summary.outcome {
        LifecycleState::Finished => "finished",
        LifecycleState::Stopped => "stopped",
        _ => "incomplete",
    };
    lines.push(format!(
        "Status: {outcome} after {}",
        metrics::format_elapsed(summary.run_query_milliseconds)
    ));
    lines.push(format!(
        "Responded: {} of {} host(s) ({}%)",
        summary.responded, summary.targeted, summary.percent_responded
    ));
    lines.push(format!(
        "  with results: {}  no results: {}  errors: {}",
        summary.responded_with_results, summary.responded_no_results, summary.responded_with_errors
    ));
    if let Some(totals) = summary.totals.as_ref() {
        if let Some((online, offline, mia)) = metrics::compute_totals_breakdown(totals) {
            lines.push(format!(
                "Targets: {} online ({online}%), {} offline ({offline}%), {} missing ({mia}%)",
                totals.online, totals.offline, totals.missing_in_action
            ));
        }
    }
    lines.push(format!("Rows: {}", summary.query_results.len()));
    for err in &summary.errors {
        let host = if err.host_display_name.is_empty() {
            &err.host_hostname
        } else {
            &err.host_display_name
        };
        lines.push(format!("Error on {host}: {}", err.error));
    }
    for msg in &summary.server_errors {
        lines.push(format!("Server error: {msg}"));
    }

    TextSummary { lines }
}
