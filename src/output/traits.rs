//! Record sink trait and run summary types
//!
//! This module defines the trait interface for record sinks and the data
//! structures describing a finished run.

use crate::output::stats::FetchFailure;
use crate::records::{Record, RecordType};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while persisting records
///
/// Any persistence error halts the run.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to write {record_type} partition {}: {source}", .path.display())]
    Io {
        record_type: RecordType,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create partition directory {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Record sink is closed")]
    Closed,
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// One partition file written during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub record_type: RecordType,
    pub path: PathBuf,
    /// Data rows written, not counting the header
    pub rows: u64,
}

/// Destination for the scheduler's record stream
///
/// Implementations write each record durably before `append` returns.
pub trait RecordSink {
    /// Appends one record to the partition for its type
    ///
    /// # Arguments
    ///
    /// * `record` - The record to persist
    fn append(&mut self, record: &Record) -> PersistenceResult<()>;

    /// Closes every open partition exactly once, in the order opened
    ///
    /// Closing an already closed sink is a no-op.
    fn close(&mut self) -> PersistenceResult<()>;

    /// Partitions opened so far, in the order opened
    fn partitions(&self) -> Vec<PartitionInfo>;
}

/// Summary of one run, as reported at the end of a run or from the ledger
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    // Run metadata
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub status: String,
    pub config_hash: String,

    // Record counts (type -> count)
    pub emitted: BTreeMap<RecordType, u64>,
    pub dropped: BTreeMap<RecordType, u64>,

    // Partition files written
    pub partitions: Vec<PartitionInfo>,

    // Failed fetches
    pub failures: Vec<FetchFailure>,

    pub rate_limit_waits: u64,
}

impl RunSummary {
    /// Creates a new empty run summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records emitted across all types
    pub fn total_records(&self) -> u64 {
        self.emitted.values().sum()
    }

    /// Returns the number of records dropped as malformed
    pub fn total_dropped(&self) -> u64 {
        self.dropped.values().sum()
    }

    /// Returns the percentage of normalized payloads that were kept
    pub fn keep_rate(&self) -> f64 {
        let seen = self.total_records() + self.total_dropped();
        if seen == 0 {
            return 0.0;
        }
        (self.total_records() as f64 / seen as f64) * 100.0
    }
}
