//! Upstream resource client
//!
//! The scheduler talks to the content source only through [`ResourceClient`].
//! [`RedditClient`] is the HTTP implementation; tests substitute scripted clients.

mod auth;
mod comments;
mod reddit;

pub use comments::{find_largest_more, flatten, prune_more, MoreNode};
pub use reddit::{build_http_client, RedditClient};

use crate::config::{SubmissionOrdering, TimeFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a single fetch
///
/// Everything except `Cancelled` is recovered per resource by the scheduler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("rate limit exceeded (retry after {retry_after:?})")]
    RateLimitExceeded { retry_after: Option<Duration> },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Short stable label used in statistics and the run ledger
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::TransientNetwork(_) => "transient_network",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::Authentication(_) => "authentication",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Quota state reported by the most recent upstream response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaSnapshot {
    /// Requests left in the current window
    pub remaining: u32,
    /// Requests used in the current window
    pub used: u32,
    /// When the window resets
    pub reset_at: DateTime<Utc>,
}

/// Parameters of a community's submission listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingRequest {
    pub ordering: SubmissionOrdering,
    pub limit: u32,
    pub time_filter: TimeFilter,
}

/// Result of a top-level fetch: the community and its submissions in listing order
#[derive(Debug, Clone)]
pub struct CommunityBatch {
    pub community: Value,
    pub submissions: Vec<Value>,
}

/// Boundary between the scheduler and the content source
///
/// Payloads are returned raw; the scheduler hands them to the normalizer.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetches a community and up to `request.limit` of its submissions
    async fn fetch_top_level(
        &self,
        community: &str,
        request: &ListingRequest,
    ) -> Result<CommunityBatch, FetchError>;

    /// Fetches a submission's comment tree as a flat list
    ///
    /// At most `expansion_depth` collapsed threads are expanded before the
    /// tree is flattened.
    async fn fetch_children(
        &self,
        submission_id: &str,
        expansion_depth: u32,
    ) -> Result<Vec<Value>, FetchError>;

    /// Fetches an author's profile
    async fn fetch_author(&self, name: &str) -> Result<Value, FetchError>;

    /// Quota reported since the last call, if any response carried one
    fn current_quota(&self) -> Option<QuotaSnapshot>;
}
