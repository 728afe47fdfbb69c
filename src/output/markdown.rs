//! Markdown summary generation
//!
//! This module renders a human-readable markdown report of a run: record
//! counts per type, the partition files written, and the fetches that failed.

use crate::output::traits::RunSummary;
use crate::records::RecordType;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary of a run
///
/// # Arguments
///
/// * `summary` - The run summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(std::io::Error)` - Failed to write summary
pub fn generate_markdown_summary(summary: &RunSummary, output_path: &Path) -> std::io::Result<()> {
    let markdown = format_markdown_summary(summary);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Subreddit Harvest Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    // Record counts
    md.push_str("## Records\n\n");
    md.push_str("| Type | Written | Dropped |\n");
    md.push_str("|------|---------|---------|\n");
    for record_type in RecordType::ALL {
        let emitted = summary.emitted.get(&record_type).copied().unwrap_or(0);
        let dropped = summary.dropped.get(&record_type).copied().unwrap_or(0);
        md.push_str(&format!("| {} | {} | {} |\n", record_type, emitted, dropped));
    }
    md.push_str(&format!(
        "\n- **Total Records**: {}\n- **Kept**: {:.2}%\n- **Rate Limit Waits**: {}\n\n",
        summary.total_records(),
        summary.keep_rate(),
        summary.rate_limit_waits
    ));

    if !summary.partitions.is_empty() {
        md.push_str("## Partitions\n\n");
        md.push_str("| Type | File | Rows |\n");
        md.push_str("|------|------|------|\n");
        for partition in &summary.partitions {
            md.push_str(&format!(
                "| {} | `{}` | {} |\n",
                partition.record_type,
                partition.path.display(),
                partition.rows
            ));
        }
        md.push('\n');
    }

    if summary.failures.is_empty() {
        md.push_str("## Failed Fetches\n\nNone.\n");
    } else {
        md.push_str(&format!(
            "## Failed Fetches ({})\n\n",
            summary.failures.len()
        ));
        md.push_str("| Tier | Resource | Error |\n");
        md.push_str("|------|----------|-------|\n");
        for failure in &summary.failures {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                failure.tier,
                failure.resource,
                failure.message.replace('|', "\\|")
            ));
        }
    }

    md
}
