//! Output module for persisting records and reporting on runs
//!
//! This module handles:
//! - Streaming records into type-partitioned CSV files
//! - Recording run statistics
//! - Generating markdown summaries of finished runs

mod markdown;
mod partition;
pub mod stats;
mod traits;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use partition::{encode_row, PartitionStore};
pub use stats::{load_statistics, print_statistics, FetchFailure, RunStatistics};
pub use traits::{PartitionInfo, PersistenceError, PersistenceResult, RecordSink, RunSummary};

use crate::storage::{RunLedger, StorageError};
use crate::HarvestError;
use chrono::{DateTime, Utc};

/// Generates a summary of a run from the ledger
///
/// # Arguments
///
/// * `ledger` - The run ledger
/// * `run_id` - The run to summarize, or the latest run when `None`
///
/// # Returns
///
/// * `Ok(RunSummary)` - Successfully generated summary
/// * `Err(HarvestError)` - Failed to query the ledger, or no run recorded
pub fn generate_summary(
    ledger: &dyn RunLedger,
    run_id: Option<i64>,
) -> Result<RunSummary, HarvestError> {
    let run = match run_id {
        Some(id) => ledger.get_run(id)?,
        None => ledger.get_latest_run()?.ok_or(StorageError::NoRuns)?,
    };

    let duration_seconds = match (
        run.started_at.parse::<DateTime<Utc>>(),
        run.finished_at.as_deref().map(str::parse::<DateTime<Utc>>),
    ) {
        (Ok(started), Some(Ok(finished))) => Some((finished - started).num_seconds().max(0) as u64),
        _ => None,
    };

    let stats = load_statistics(ledger, run.id)?;
    let partitions = ledger.get_partitions(run.id)?;

    Ok(RunSummary {
        run_id: run.id,
        started_at: run.started_at,
        finished_at: run.finished_at,
        duration_seconds,
        status: run.status.to_db_string().to_string(),
        config_hash: run.config_hash,
        emitted: stats.emitted,
        dropped: stats.dropped,
        partitions,
        failures: stats.failures,
        rate_limit_waits: stats.rate_limit_waits,
    })
}
