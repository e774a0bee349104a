use anyhow::{Context, Result};
use tracing::info;

use crate::cli::OutputFormat;
use sensei_memory::{LifecycleSweeper, SweepReport};

/// Run a full lifecycle sweep and print the summary.
///
/// The tool is best-effort: per-item errors are reported in the summary but
/// the exit code stays zero. Only an unreachable backend (or denied access)
/// at the start of a pass fails the command; even then the summary of
/// whatever was already deleted is printed before the error.
pub async fn run(region: &str, memory_id: &str, format: OutputFormat) -> Result<()> {
    info!(region, "starting memory purge");

    let sweeper = LifecycleSweeper::new(super::backend(region));
    let mut report = SweepReport::default();
    let outcome = sweeper.sweep_all(memory_id, &mut report).await;

    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_summary(&report));
    }

    outcome.context("memory backend unreachable")
}

fn render_summary(report: &SweepReport) -> String {
    let mut out = String::from("Purge finished:\n");
    out.push_str(&format!("  sessions processed: {}\n", report.sessions_processed));
    out.push_str(&format!("  events deleted:     {}\n", report.events_deleted));
    out.push_str(&format!("  records deleted:    {}\n", report.records_deleted));
    out.push_str(&format!("  errors:             {}\n", report.errors.len()));
    for error in &report.errors {
        out.push_str(&format!("    {} - {}\n", error.item, error.message));
    }
    out
}
