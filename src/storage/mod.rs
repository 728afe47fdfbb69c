//! Run ledger
//!
//! A small SQLite database recording each harvest run: when it started and
//! finished, how it ended, how many records of each type it wrote, which
//! partition files it produced and which fetches failed. It never holds the
//! harvested records themselves.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteLedger;
pub use traits::{RecordCounts, RunLedger, StorageError, StorageResult};

use std::path::Path;

/// Opens (or creates) the run ledger
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteLedger)` - Successfully opened ledger
/// * `Err(StorageError)` - Failed to open the database
pub fn open_ledger(path: &Path) -> StorageResult<SqliteLedger> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        // Connection::open does not create directories
        std::fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    SqliteLedger::new(path)
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub rate_limit_waits: u64,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
