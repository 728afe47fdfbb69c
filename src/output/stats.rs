//! Run statistics
//!
//! Counts gathered by the scheduler during a run, persisted to the run ledger
//! at the end of the run and loaded back for reporting.

use crate::client::FetchError;
use crate::records::RecordType;
use crate::storage::RunLedger;
use crate::HarvestError;
use std::collections::BTreeMap;

/// A fetch that failed after retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    /// Tier of the failed fetch (community, comment_tree, author)
    pub tier: String,

    /// Identifier of the failed resource
    pub resource: String,

    /// Error kind label
    pub kind: String,

    /// Error message
    pub message: String,
}

/// Statistics of one run
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
    /// Records handed to the sink, by type
    pub emitted: BTreeMap<RecordType, u64>,

    /// Malformed records dropped, by type
    pub dropped: BTreeMap<RecordType, u64>,

    /// Failed fetches, in the order they failed
    pub failures: Vec<FetchFailure>,

    /// Fetches that had to wait on the rate governor
    pub rate_limit_waits: u64,

    /// Whether the run was cancelled before the frontier drained
    pub cancelled: bool,
}

impl RunStatistics {
    pub fn record_emitted(&mut self, record_type: RecordType) {
        *self.emitted.entry(record_type).or_insert(0) += 1;
    }

    pub fn record_dropped(&mut self, record_type: RecordType) {
        *self.dropped.entry(record_type).or_insert(0) += 1;
    }

    pub fn record_failure(&mut self, tier: &str, resource: &str, error: &FetchError) {
        self.failures.push(FetchFailure {
            tier: tier.to_string(),
            resource: resource.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }

    pub fn emitted_count(&self, record_type: RecordType) -> u64 {
        self.emitted.get(&record_type).copied().unwrap_or(0)
    }

    pub fn total_emitted(&self) -> u64 {
        self.emitted.values().sum()
    }

    pub fn total_dropped(&self) -> u64 {
        self.dropped.values().sum()
    }
}

/// Loads the statistics of a run from the ledger
///
/// # Arguments
///
/// * `ledger` - The run ledger to query
/// * `run_id` - The run to load
///
/// # Returns
///
/// * `Ok(RunStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query the ledger
pub fn load_statistics(ledger: &dyn RunLedger, run_id: i64) -> Result<RunStatistics, HarvestError> {
    let run = ledger.get_run(run_id)?;
    let (emitted, dropped) = ledger.get_record_counts(run_id)?;
    let failures = ledger.get_fetch_failures(run_id)?;

    Ok(RunStatistics {
        emitted,
        dropped,
        failures,
        rate_limit_waits: run.rate_limit_waits,
        cancelled: run.status == crate::storage::RunStatus::Interrupted,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &RunStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Records by Type:");
    for record_type in RecordType::ALL {
        let emitted = stats.emitted_count(record_type);
        let dropped = stats.dropped.get(&record_type).copied().unwrap_or(0);
        if emitted == 0 && dropped == 0 {
            continue;
        }
        println!(
            "  {}: {} written, {} dropped as malformed",
            record_type, emitted, dropped
        );
    }
    println!(
        "  Total: {} written, {} dropped",
        stats.total_emitted(),
        stats.total_dropped()
    );
    println!();

    println!("Rate limit waits: {}", stats.rate_limit_waits);
    println!();

    if !stats.failures.is_empty() {
        println!("Failed Fetches ({}):", stats.failures.len());
        for failure in &stats.failures {
            println!(
                "  - {} {}: {}",
                failure.tier, failure.resource, failure.message
            );
        }
        println!();
    }

    if stats.cancelled {
        println!("Run was cancelled before completion.");
    }
}
