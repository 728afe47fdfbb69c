use serde::Deserialize;
use std::fmt;

/// Main configuration structure for a harvest run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvest: HarvestConfig,
    pub client: ClientConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub credentials: Credentials,
    pub output: OutputConfig,
}

/// Traversal parameters, documented alongside the data as the run's config record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HarvestConfig {
    /// Communities to crawl, in order
    pub communities: Vec<String>,

    /// Upper bound on submissions fetched per community
    pub submissions_per_community: u32,

    /// Listing the submissions are drawn from
    #[serde(default)]
    pub submission_ordering: SubmissionOrdering,

    /// Time window, only meaningful for the `top` ordering
    #[serde(default)]
    pub time_filter: TimeFilter,

    /// Number of collapsed-thread replacement operations per comment tree
    #[serde(default)]
    pub comment_expansion_depth: u32,

    /// Whether to fetch one author profile per unique author
    #[serde(default)]
    pub fetch_authors: bool,

    /// Whether all communities are fetched before any comment tree
    #[serde(default)]
    pub traversal_order: TraversalOrder,
}

/// Submission listing used for the community fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionOrdering {
    /// Most recent activity
    Hot,
    /// Newest by creation time
    #[default]
    New,
    /// Highest score within the time filter
    Top,
    /// Fastest rising
    Rising,
}

impl SubmissionOrdering {
    /// Path segment of the upstream listing endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::New => "new",
            Self::Top => "top",
            Self::Rising => "rising",
        }
    }
}

impl fmt::Display for SubmissionOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time window for the `top` ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    Day,
    Week,
    Month,
    Year,
    #[default]
    All,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering policy between the community tier and the comment tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalOrder {
    /// Every community's submissions are emitted before any comment tree is fetched
    #[default]
    Breadth,
    /// A community's comment trees are fetched before the next community
    Depth,
}

/// Upstream client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientConfig {
    /// User agent sent with every request
    pub user_agent: String,

    /// Base URL of the authenticated API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Token endpoint for the password grant
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries for transient network failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between transient retries (milliseconds)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_api_base() -> String {
    "https://oauth.reddit.com".to_string()
}

fn default_auth_url() -> String {
    "https://www.reddit.com/api/v1/access_token".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5000
}

/// Rate governor tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GovernorConfig {
    /// Remaining quota at or below which fetches block until reset
    #[serde(default)]
    pub reserve: u32,

    /// How many rate-limit rejections a single fetch may wait out
    #[serde(default = "default_max_rate_limit_waits")]
    pub max_rate_limit_waits: u32,

    /// Wait applied when a rejection carries no reset information (seconds)
    #[serde(default = "default_fallback_wait")]
    pub fallback_wait_secs: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            reserve: 0,
            max_rate_limit_waits: default_max_rate_limit_waits(),
            fallback_wait_secs: default_fallback_wait(),
        }
    }
}

fn default_max_rate_limit_waits() -> u32 {
    3
}

fn default_fallback_wait() -> u64 {
    60
}

/// Script-app credentials for the password grant
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Credentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Root directory of the type-partitioned CSV files
    pub data_dir: String,

    /// Path to the SQLite run ledger
    pub ledger_path: String,

    /// Path to the markdown run summary
    #[serde(default)]
    pub summary_path: Option<String>,
}
