//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! with credentials optionally supplied through the environment.
//!
//! # Example
//!
//! ```no_run
//! use subreddit_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Submissions per community: {}", config.harvest.submissions_per_community);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClientConfig, Config, Credentials, GovernorConfig, HarvestConfig, OutputConfig,
    SubmissionOrdering, TimeFilter, TraversalOrder,
};

// Re-export parser functions
pub use parser::{
    apply_credential_overrides, compute_config_hash, load_config, load_config_with_hash,
    parse_config, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_PASSWORD, ENV_USERNAME,
};
pub use validation::validate;
