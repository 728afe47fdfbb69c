//! Subreddit-Harvest: a tiered community crawler
//!
//! This crate walks a hierarchical content source (communities → submissions →
//! comment trees → authors), paces itself against the upstream-reported quota,
//! and streams every normalized record into append-only, type-partitioned CSV files.

pub mod client;
pub mod config;
pub mod crawler;
pub mod normalize;
pub mod output;
pub mod records;
pub mod storage;

use thiserror::Error;

/// Main error type for harvest operations
///
/// Only errors that halt a run end up here. Per-resource fetch failures and
/// malformed records are absorbed by the scheduler and surface in the run statistics.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] client::FetchError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] output::PersistenceError),

    #[error("Run ledger error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use client::{FetchError, RedditClient, ResourceClient};
pub use config::Config;
pub use crawler::{Coordinator, RateGovernor, Scheduler};
pub use normalize::{normalize, MalformedRecordError};
pub use output::{PartitionStore, RecordSink, RunStatistics};
pub use records::{Record, RecordType};
