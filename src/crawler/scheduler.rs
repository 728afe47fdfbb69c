//! Crawl scheduler
//!
//! This module handles:
//! - The priority frontier of pending fetches across the four tiers
//! - Lazy, pull-based emission of normalized records
//! - Governor-gated fetching with retries for transient and rate-limit errors
//! - Per-resource failure isolation
//! - Author deduplication within a run

use crate::client::{CommunityBatch, FetchError, ListingRequest, ResourceClient};
use crate::config::{Config, HarvestConfig, TraversalOrder};
use crate::crawler::governor::RateGovernor;
use crate::normalize::normalize;
use crate::output::RunStatistics;
use crate::records::{Record, RecordType, ScrapeConfigRecord};
use chrono::Utc;
use futures::stream::{self, Stream};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Author names that never resolve to a profile
const DELETED_AUTHOR: &str = "[deleted]";

/// A resource the scheduler knows how to turn into records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// The run's own parameters; emitted, not fetched
    Config,
    /// A configured community and its submission listing
    Community { name: String, index: usize },
    /// The comment tree of one submission
    CommentTree {
        submission_id: String,
        community_index: usize,
    },
    /// An author profile
    Author { name: String, community_index: usize },
}

impl ResourceKind {
    /// Traversal tier; lower tiers are more urgent
    pub fn tier(&self) -> u8 {
        match self {
            Self::Config => 0,
            Self::Community { .. } => 1,
            Self::CommentTree { .. } => 2,
            Self::Author { .. } => 3,
        }
    }

    pub fn tier_name(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Community { .. } => "community",
            Self::CommentTree { .. } => "comment_tree",
            Self::Author { .. } => "author",
        }
    }

    /// Identifier of the resource, as used in logs and failure records
    pub fn resource_id(&self) -> &str {
        match self {
            Self::Config => "config",
            Self::Community { name, .. } => name,
            Self::CommentTree { submission_id, .. } => submission_id,
            Self::Author { name, .. } => name,
        }
    }

    fn community_index(&self) -> usize {
        match self {
            Self::Config => 0,
            Self::Community { index, .. } => *index,
            Self::CommentTree {
                community_index, ..
            }
            | Self::Author {
                community_index, ..
            } => *community_index,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tier_name(), self.resource_id())
    }
}

/// Sort key of a pending fetch; smaller keys are fetched first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PriorityKey {
    /// Community index in depth-first order, always 0 in breadth-first order
    group: usize,
    tier: u8,
    /// Enqueue order, preserving source order within a tier
    seq: u64,
}

/// A fetch waiting in the frontier
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub kind: ResourceKind,
    key: PriorityKey,
}

// Reverse comparison so the smallest key is popped first from the BinaryHeap
impl Ord for FetchTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key)
    }
}

impl PartialOrd for FetchTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FetchTask {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for FetchTask {}

/// Retry limits applied to every fetch
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_rate_limit_waits: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.client.max_retries,
            retry_delay: Duration::from_millis(config.client.retry_delay_ms),
            max_rate_limit_waits: config.governor.max_rate_limit_waits,
        }
    }
}

/// Payload of a successful fetch
enum Fetched {
    Community(CommunityBatch),
    Comments(Vec<Value>),
    Author(Value),
}

/// Scheduler drives the traversal and yields records one at a time
///
/// The scheduler coordinates:
/// - Tier ordering (config, communities, comment trees, authors)
/// - Breadth-first or depth-first grouping across communities
/// - Holding fetches back while the quota window is exhausted
/// - Isolation of failed fetches to their own subtree
///
/// A scheduler runs once; re-running needs a new instance.
pub struct Scheduler<C: ResourceClient> {
    client: Arc<C>,
    governor: Arc<RateGovernor>,
    harvest: HarvestConfig,
    retry: RetryPolicy,

    /// Frontier priority queue (smaller keys are fetched first)
    frontier: BinaryHeap<FetchTask>,

    /// Records produced by the last fetch and not yet handed out
    ready: VecDeque<Record>,

    /// Author names already queued for fetching
    visited_author_ids: HashSet<String>,

    /// Author record ids already emitted
    emitted_author_ids: HashSet<String>,

    seq: u64,
    run_started_at: i64,
    cancel: CancellationToken,
    stats: RunStatistics,
}

impl<C: ResourceClient> Scheduler<C> {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - The harvest configuration
    /// * `client` - The resource client used for every fetch
    /// * `governor` - The rate governor shared by all fetchers
    /// * `cancel` - Token that stops the traversal when cancelled
    /// * `run_started_at` - Unix timestamp of the run start
    pub fn new(
        config: &Config,
        client: Arc<C>,
        governor: Arc<RateGovernor>,
        cancel: CancellationToken,
        run_started_at: i64,
    ) -> Self {
        let mut scheduler = Self {
            client,
            governor,
            harvest: config.harvest.clone(),
            retry: RetryPolicy::from_config(config),
            frontier: BinaryHeap::new(),
            ready: VecDeque::new(),
            visited_author_ids: HashSet::new(),
            emitted_author_ids: HashSet::new(),
            seq: 0,
            run_started_at,
            cancel,
            stats: RunStatistics::default(),
        };
        scheduler.enqueue(ResourceKind::Config);
        scheduler
    }

    /// Adds a fetch to the frontier
    fn enqueue(&mut self, kind: ResourceKind) {
        let group = match self.harvest.traversal_order {
            TraversalOrder::Breadth => 0,
            TraversalOrder::Depth => kind.community_index(),
        };
        let key = PriorityKey {
            group,
            tier: kind.tier(),
            seq: self.seq,
        };
        self.seq += 1;
        self.frontier.push(FetchTask { kind, key });
    }

    /// Returns the next record, fetching as needed
    ///
    /// # Returns
    ///
    /// * `Some(Record)` - The next record in traversal order
    /// * `None` - The traversal is finished or was cancelled
    pub async fn next_record(&mut self) -> Option<Record> {
        loop {
            if let Some(record) = self.ready.pop_front() {
                return Some(record);
            }

            if self.cancel.is_cancelled() {
                if !self.frontier.is_empty() {
                    info!(
                        "Harvest cancelled, abandoning {} pending fetches",
                        self.frontier.len()
                    );
                    self.frontier.clear();
                }
                self.stats.cancelled = true;
                return None;
            }

            let task = self.frontier.pop()?;
            self.execute(task.kind).await;
        }
    }

    /// Turns the scheduler into a lazy stream of records
    pub fn into_stream(self) -> impl Stream<Item = Record> {
        stream::unfold(self, |mut scheduler| async move {
            scheduler
                .next_record()
                .await
                .map(|record| (record, scheduler))
        })
    }

    /// Returns the statistics gathered so far
    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    /// Returns the number of fetches still pending
    pub fn frontier_size(&self) -> usize {
        self.frontier.len()
    }

    async fn execute(&mut self, kind: ResourceKind) {
        if kind == ResourceKind::Config {
            self.emit_config();
            return;
        }

        let fetched = self.fetch(&kind).await;
        // Every record produced by this fetch shares one timestamp, taken
        // once the data has arrived
        let scraped_at = Utc::now().timestamp();

        match fetched {
            Ok(Fetched::Community(batch)) => self.accept_community(&kind, batch, scraped_at),
            Ok(Fetched::Comments(comments)) => self.accept_comments(&kind, comments, scraped_at),
            Ok(Fetched::Author(author)) => self.accept_author(author, scraped_at),
            Err(FetchError::Cancelled) => debug!("Fetch of {} cancelled", kind),
            Err(e) => {
                warn!("Fetch failed for {}: {}", kind, e);
                self.stats
                    .record_failure(kind.tier_name(), kind.resource_id(), &e);
            }
        }
    }

    fn emit_config(&mut self) {
        let record = ScrapeConfigRecord {
            community_ids: self.harvest.communities.clone(),
            submissions_per_community: self.harvest.submissions_per_community,
            submission_ordering_mode: self.harvest.submission_ordering.as_str().to_string(),
            time_filter: self.harvest.time_filter.as_str().to_string(),
            comment_expansion_depth: self.harvest.comment_expansion_depth,
            scraped_at: self.run_started_at,
        };
        self.push_record(Record::Config(record));

        for (index, name) in self.harvest.communities.clone().into_iter().enumerate() {
            self.enqueue(ResourceKind::Community { name, index });
        }
    }

    /// Fetches one resource through the governor, retrying where allowed
    async fn fetch(&mut self, kind: &ResourceKind) -> Result<Fetched, FetchError> {
        let mut retries = 0;
        let mut rate_limit_waits = 0;

        loop {
            // Requests inside the fetch claim quota themselves; here the
            // whole resource is only held back while the window is exhausted
            let gated = self.governor.await_window(&self.cancel).await;
            self.stats.rate_limit_waits = self.governor.wait_count();
            gated?;

            let result = tokio::select! {
                _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
                result = self.call(kind) => result,
            };
            self.governor.after_fetch(self.client.current_quota());
            self.stats.rate_limit_waits = self.governor.wait_count();

            match result {
                Err(FetchError::TransientNetwork(reason)) if retries < self.retry.max_retries => {
                    retries += 1;
                    warn!(
                        "Transient error for {} ({}), retry {}/{}",
                        kind, reason, retries, self.retry.max_retries
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(self.retry.retry_delay) => {}
                    }
                }
                Err(FetchError::RateLimitExceeded { retry_after })
                    if rate_limit_waits < self.retry.max_rate_limit_waits =>
                {
                    rate_limit_waits += 1;
                    warn!(
                        "Rate limited on {}, waiting for the governor ({}/{})",
                        kind, rate_limit_waits, self.retry.max_rate_limit_waits
                    );
                    self.governor.note_rate_limited(retry_after);
                }
                other => return other,
            }
        }
    }

    async fn call(&self, kind: &ResourceKind) -> Result<Fetched, FetchError> {
        match kind {
            ResourceKind::Config => Err(FetchError::InvalidResponse(
                "configuration is emitted, not fetched".to_string(),
            )),
            ResourceKind::Community { name, .. } => {
                let request = ListingRequest {
                    ordering: self.harvest.submission_ordering,
                    limit: self.harvest.submissions_per_community,
                    time_filter: self.harvest.time_filter,
                };
                self.client
                    .fetch_top_level(name, &request)
                    .await
                    .map(Fetched::Community)
            }
            ResourceKind::CommentTree { submission_id, .. } => self
                .client
                .fetch_children(submission_id, self.harvest.comment_expansion_depth)
                .await
                .map(Fetched::Comments),
            ResourceKind::Author { name, .. } => {
                self.client.fetch_author(name).await.map(Fetched::Author)
            }
        }
    }

    fn accept_community(&mut self, kind: &ResourceKind, batch: CommunityBatch, scraped_at: i64) {
        let community_index = kind.community_index();
        let limit = self.harvest.submissions_per_community as usize;
        let CommunityBatch {
            community,
            mut submissions,
        } = batch;

        if submissions.len() > limit {
            debug!(
                "{} returned {} submissions, keeping {}",
                kind,
                submissions.len(),
                limit
            );
            submissions.truncate(limit);
        }

        if let Some(record) = self.normalize_or_drop(RecordType::Community, &community, scraped_at)
        {
            self.push_record(record);
        }

        let mut accepted = 0;
        for raw in &submissions {
            let Some(record) = self.normalize_or_drop(RecordType::Submission, raw, scraped_at)
            else {
                continue;
            };

            if let Record::Submission(submission) = &record {
                self.enqueue(ResourceKind::CommentTree {
                    submission_id: submission.id.clone(),
                    community_index,
                });
                self.enqueue_author(&submission.author, community_index);
            }
            self.push_record(record);
            accepted += 1;
        }

        info!("Harvested {}: {} submissions", kind, accepted);
    }

    fn accept_comments(&mut self, kind: &ResourceKind, comments: Vec<Value>, scraped_at: i64) {
        let community_index = kind.community_index();
        let mut accepted = 0;

        for raw in &comments {
            let Some(record) = self.normalize_or_drop(RecordType::Comment, raw, scraped_at) else {
                continue;
            };

            if let Record::Comment(comment) = &record {
                self.enqueue_author(&comment.author, community_index);
            }
            self.push_record(record);
            accepted += 1;
        }

        debug!("Harvested {}: {} comments", kind, accepted);
    }

    fn accept_author(&mut self, author: Value, scraped_at: i64) {
        let Some(record) = self.normalize_or_drop(RecordType::Author, &author, scraped_at) else {
            return;
        };

        if let Some(id) = record.id() {
            if !self.emitted_author_ids.insert(id.to_string()) {
                debug!("Author {} already emitted", id);
                return;
            }
        }
        self.push_record(record);
    }

    /// Queues an author fetch unless authors are disabled or already seen
    fn enqueue_author(&mut self, name: &str, community_index: usize) {
        if !self.harvest.fetch_authors || name.is_empty() || name == DELETED_AUTHOR {
            return;
        }
        if self.visited_author_ids.insert(name.to_string()) {
            self.enqueue(ResourceKind::Author {
                name: name.to_string(),
                community_index,
            });
        }
    }

    fn normalize_or_drop(
        &mut self,
        record_type: RecordType,
        raw: &Value,
        scraped_at: i64,
    ) -> Option<Record> {
        match normalize(record_type, raw, scraped_at) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Dropping record: {}", e);
                self.stats.record_dropped(record_type);
                None
            }
        }
    }

    fn push_record(&mut self, record: Record) {
        self.stats.record_emitted(record.record_type());
        self.ready.push_back(record);
    }
}
