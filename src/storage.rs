//! Run history and exports.

use crate::model::{CampaignSummary, HostError, Row};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const HOSTNAME_COLUMN: &str = "host_hostname";

fn runs_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine a data directory")?;
    Ok(base.join("fleet-live-query").join("runs"))
}

/// Persist a finished run under the data directory and return its path.
pub fn save_run(summary: &CampaignSummary) -> Result<PathBuf> {
    save_run_in(&runs_dir()?, summary)
}

fn save_run_in(dir: &Path, summary: &CampaignSummary) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let stamp: String = summary
        .ended_at_utc
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let id = summary.campaign.as_ref().map(|c| c.id).unwrap_or_default();
    let path = dir.join(format!("campaign-{id}-{stamp}.json"));
    export_json(&path, summary)?;
    Ok(path)
}

pub fn export_json(path: &Path, summary: &CampaignSummary) -> Result<()> {
    let body = serde_json::to_string_pretty(summary)?;
    fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Write result rows as CSV, `host_hostname` first, remaining columns sorted.
pub fn export_csv(path: &Path, rows: &[Row]) -> Result<()> {
    let mut out = Vec::new();
    write_rows_csv(&mut out, rows)?;
    fs::write(path, out).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn export_errors_csv(path: &Path, errors: &[HostError]) -> Result<()> {
    let mut out = Vec::new();
    writeln!(out, "host_hostname,host_display_name,error")?;
    for e in errors {
        writeln!(
            out,
            "{},{},{}",
            csv_field(&e.host_hostname),
            csv_field(&e.host_display_name),
            csv_field(&e.error)
        )?;
    }
    fs::write(path, out).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn write_rows_csv(out: &mut impl Write, rows: &[Row]) -> Result<()> {
    let mut columns: Vec<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .filter(|key| *key != HOSTNAME_COLUMN)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    columns.insert(0, HOSTNAME_COLUMN);

    writeln!(out, "{}", columns.join(","))?;
    for row in rows {
        let line: Vec<String> = columns
            .iter()
            .map(|col| csv_field(row.get(*col).map(String::as_str).unwrap_or("")))
            .collect();
        writeln!(out, "{}", line.join(","))?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn csv_puts_hostname_first_and_fills_gaps() {
        let rows = vec![
            row(&[("version", "5.1"), ("host_hostname", "a"), ("arch", "x86")]),
            row(&[("host_hostname", "b"), ("build", "22H2")]),
        ];
        let mut out = Vec::new();
        write_rows_csv(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "host_hostname,arch,build,version");
        assert_eq!(lines[1], "a,x86,,5.1");
        assert_eq!(lines[2], "b,,22H2,");
    }

    #[test]
    fn csv_fields_are_quoted_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn saved_run_round_trips_counts() {
        let dir = std::env::temp_dir().join(format!("flq-test-{}", std::process::id()));
        let summary: CampaignSummary = serde_json::from_value(serde_json::json!({
            "started_at_utc": "2026-01-01T00:00:00Z",
            "ended_at_utc": "2026-01-01T00:00:05Z",
            "outcome": "Finished",
            "campaign": {"id": 4, "query": "select 1", "hosts_count": {"total": 3}},
            "run_query_milliseconds": 5000,
            "targeted": 3,
            "responded": 2,
            "responded_with_results": 2,
            "responded_no_results": 0,
            "responded_with_errors": 0,
            "percent_responded": 67
        }))
        .unwrap();
        let path = save_run_in(&dir, &summary).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("campaign-4-"));
        let loaded: CampaignSummary =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.responded, 2);
        assert_eq!(loaded.percent_responded, 67);
        let _ = fs::remove_dir_all(dir);
    }
}
