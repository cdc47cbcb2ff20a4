//! Post-run processing utilities.
//!
//! Handles auto-save and exports after a campaign ends.

use crate::cli::Cli;
use crate::model::CampaignSummary;
use crate::storage;

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub export_messages: Vec<String>,
    pub auto_saved_path: Option<std::path::PathBuf>,
}

/// Save the summary if requested and write the configured exports.
///
/// Export failures are reported as messages rather than failing the run.
pub(crate) fn process_campaign_completion(args: &Cli, summary: &CampaignSummary) -> ProcessedRun {
    let auto_saved_path = if args.auto_save {
        match storage::save_run(summary) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %e, "auto-save failed");
                None
            }
        }
    } else {
        None
    };

    let mut export_messages = Vec::new();
    if let Some(export_path) = args.export_json.as_deref() {
        match storage::export_json(export_path, summary) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }
    if let Some(export_path) = args.export_csv.as_deref() {
        match storage::export_csv(export_path, &summary.query_results) {
            Ok(_) => export_messages.push(format!("Exported CSV: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export CSV failed: {e:#}")),
        }
    }
    if let Some(export_path) = args.export_errors_csv.as_deref() {
        match storage::export_errors_csv(export_path, &summary.errors) {
            Ok(_) => export_messages.push(format!("Exported errors CSV: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export errors CSV failed: {e:#}")),
        }
    }

    ProcessedRun {
        export_messages,
        auto_saved_path,
    }
}
