//! Crawler module for the tiered traversal
//!
//! This module contains the core harvesting logic, including:
//! - Quota-aware pacing of fetches
//! - Tier-ordered scheduling with failure isolation
//! - Overall run coordination

mod coordinator;
mod governor;
mod scheduler;

pub use coordinator::{run_harvest, Coordinator};
pub use governor::{GovernorDecision, RateGovernor};
pub use scheduler::{FetchTask, ResourceKind, RetryPolicy, Scheduler};
