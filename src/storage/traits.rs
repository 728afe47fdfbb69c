//! Run ledger trait and error types

use crate::output::stats::{FetchFailure, RunStatistics};
use crate::output::PartitionInfo;
use crate::records::RecordType;
use crate::storage::{RunRecord, RunStatus};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("No harvest runs recorded")]
    NoRuns,

    #[error("Cannot create ledger directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for ledger operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Per-type record counts: (written, dropped)
pub type RecordCounts = (BTreeMap<RecordType, u64>, BTreeMap<RecordType, u64>);

/// Bookkeeping of harvest runs
///
/// The ledger records what each run did; the harvested records themselves
/// live only in the partition files.
pub trait RunLedger {
    // ===== Run Management =====

    /// Creates a new run in the `running` state
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The id of the new run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by id
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets a terminal status and the finish time
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Run Results =====

    /// Stores counts, failures and governor waits of a run
    fn record_statistics(&mut self, run_id: i64, stats: &RunStatistics) -> StorageResult<()>;

    /// Stores the partition files written by a run
    fn record_partitions(&mut self, run_id: i64, partitions: &[PartitionInfo])
        -> StorageResult<()>;

    /// Gets written and dropped counts per record type
    fn get_record_counts(&self, run_id: i64) -> StorageResult<RecordCounts>;

    /// Gets failed fetches, in the order they failed
    fn get_fetch_failures(&self, run_id: i64) -> StorageResult<Vec<FetchFailure>>;

    /// Gets partition files, in the order they were opened
    fn get_partitions(&self, run_id: i64) -> StorageResult<Vec<PartitionInfo>>;
}
