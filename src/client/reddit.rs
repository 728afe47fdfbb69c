//! Reddit HTTP client
//!
//! Implements [`ResourceClient`] against the OAuth API:
//! - password-grant authentication with a cached bearer token
//! - paginated submission listings
//! - comment-tree expansion through `morechildren` and continue-thread fetches
//! - quota tracking from the `x-ratelimit-*` response headers, with every
//!   request gated by the shared [`RateGovernor`]
//! - status-code classification into [`FetchError`]

use super::auth::{request_token, AccessToken, PasswordGrant};
use super::comments::{find_largest_more, flatten, nest_things, prune_more, replace_at};
use super::{CommunityBatch, FetchError, ListingRequest, QuotaSnapshot, ResourceClient};
use crate::config::{ClientConfig, Credentials, SubmissionOrdering};
use crate::crawler::RateGovernor;
use crate::normalize::strip_namespace;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{redirect::Policy, Client, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upstream caps listing pages and `morechildren` batches at this size
const PAGE_SIZE: usize = 100;

/// Builds the HTTP client used for every upstream call
///
/// Redirects are not followed: upstream answers a request for a missing
/// community with a redirect to its search page.
///
/// # Arguments
///
/// * `config` - The client configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ClientConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

pub struct RedditClient {
    http: Client,
    api_base: String,
    auth_url: String,
    grant: PasswordGrant,
    token: tokio::sync::Mutex<Option<AccessToken>>,
    quota: Mutex<Option<QuotaSnapshot>>,
    governor: Arc<RateGovernor>,
    cancel: CancellationToken,
}

impl RedditClient {
    /// Creates a client; credentials are expected to be validated already
    ///
    /// # Arguments
    ///
    /// * `config` - The client configuration
    /// * `credentials` - Script-app credentials for the password grant
    /// * `governor` - Rate governor consulted before every request
    /// * `cancel` - Token that aborts a request waiting on the governor
    pub fn new(
        config: &ClientConfig,
        credentials: &Credentials,
        governor: Arc<RateGovernor>,
        cancel: CancellationToken,
    ) -> Result<Self, reqwest::Error> {
        let field = |value: &Option<String>| value.clone().unwrap_or_default();

        Ok(Self {
            http: build_http_client(config)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            auth_url: config.auth_url.clone(),
            grant: PasswordGrant {
                client_id: field(&credentials.client_id),
                client_secret: field(&credentials.client_secret),
                username: field(&credentials.username),
                password: field(&credentials.password),
            },
            token: tokio::sync::Mutex::new(None),
            quota: Mutex::new(None),
            governor,
            cancel,
        })
    }

    /// Obtains a token up front so bad credentials fail the run before it starts
    pub async fn authenticate(&self) -> Result<(), FetchError> {
        self.access_token().await.map(|_| ())
    }

    async fn access_token(&self) -> Result<String, FetchError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = request_token(&self.http, &self.auth_url, &self.grant).await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    async fn clear_token(&self) {
        *self.token.lock().await = None;
    }

    /// Issues an authenticated GET and decodes the JSON body
    ///
    /// A rate-limit rejection is waited out and the same request re-sent, so
    /// a multi-request fetch keeps the progress it has made.
    async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let mut rate_limit_waits = 0;

        loop {
            match self.send_get(endpoint, query).await {
                Err(FetchError::RateLimitExceeded { retry_after })
                    if rate_limit_waits < self.governor.max_rate_limit_waits() =>
                {
                    rate_limit_waits += 1;
                    warn!(
                        "Rate limited on {}, waiting for the governor ({}/{})",
                        endpoint,
                        rate_limit_waits,
                        self.governor.max_rate_limit_waits()
                    );
                    self.governor.note_rate_limited(retry_after);
                }
                other => return other,
            }
        }
    }

    async fn send_get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.api_base, endpoint);

        self.governor.acquire(&self.cancel).await?;
        debug!("GET {}", endpoint);
        let sent = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("raw_json", "1")])
            .query(query)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                self.governor.after_fetch(None);
                return Err(classify_transport_error(endpoint, e));
            }
        };
        self.record_quota(response.headers());

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                // Expired or revoked token; the retry re-authenticates
                self.clear_token().await;
            }
            return Err(classify_status(endpoint, status, response.headers()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::InvalidResponse(format!("{}: {}", endpoint, e)))
    }

    /// Hands the reported quota to the governor and keeps the latest snapshot
    fn record_quota(&self, headers: &HeaderMap) {
        let snapshot = parse_quota(headers);
        self.governor.after_fetch(snapshot);

        if let Some(snapshot) = snapshot {
            debug!(
                "Quota: {} remaining, {} used, resets at {}",
                snapshot.remaining, snapshot.used, snapshot.reset_at
            );
            if let Ok(mut quota) = self.quota.lock() {
                *quota = Some(snapshot);
            }
        }
    }

    /// Replaces one collapsed placeholder; returns false when none is left
    async fn expand_once(
        &self,
        submission_id: &str,
        forest: &mut Vec<Value>,
    ) -> Result<bool, FetchError> {
        let Some(more) = find_largest_more(forest) else {
            return Ok(false);
        };

        let replacement = if more.is_continue_thread() {
            let parent = strip_namespace(&more.parent_id).to_string();
            let response = self
                .get_json(&format!("/comments/{}/_/{}", submission_id, parent), &[])
                .await?;
            // The focal comment comes back with its replies nested
            comment_forest(&response)?
                .first()
                .and_then(|focal| focal.pointer("/data/replies/data/children"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        } else {
            let batch = &more.children[..more.children.len().min(PAGE_SIZE)];
            let query = [
                ("api_type", "json".to_string()),
                ("link_id", format!("t3_{}", submission_id)),
                ("children", batch.join(",")),
            ];
            let response = self.get_json("/api/morechildren", &query).await?;
            let things = response
                .pointer("/json/data/things")
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| {
                    FetchError::InvalidResponse("morechildren without things".to_string())
                })?;

            let mut nodes = nest_things(things);
            if more.children.len() > PAGE_SIZE {
                let rest = &more.children[PAGE_SIZE..];
                let count = (more.count - PAGE_SIZE as i64).max(rest.len() as i64);
                nodes.push(serde_json::json!({"kind": "more", "data": {
                    "id": rest[0],
                    "parent_id": more.parent_id,
                    "count": count,
                    "children": rest,
                }}));
            }
            nodes
        };

        if !replace_at(forest, &more.path, replacement) {
            warn!("Collapsed thread moved during expansion of {}", submission_id);
            return Ok(false);
        }
        Ok(true)
    }
}

fn classify_transport_error(endpoint: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::TransientNetwork(format!("{}: request timeout", endpoint))
    } else if e.is_connect() {
        FetchError::TransientNetwork(format!("{}: connection failed", endpoint))
    } else {
        FetchError::TransientNetwork(format!("{}: {}", endpoint, e))
    }
}

/// Maps a non-success status to a fetch error
fn classify_status(endpoint: &str, status: StatusCode, headers: &HeaderMap) -> FetchError {
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound(endpoint.to_string()),
        s if s.is_redirection() => FetchError::NotFound(format!("{} (redirected)", endpoint)),
        StatusCode::FORBIDDEN => FetchError::Forbidden(endpoint.to_string()),
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimitExceeded {
            retry_after: header_f64(headers, "retry-after")
                .or_else(|| header_f64(headers, "x-ratelimit-reset"))
                .map(|secs| Duration::from_secs_f64(secs.max(0.0))),
        },
        StatusCode::UNAUTHORIZED => {
            FetchError::TransientNetwork(format!("{}: access token rejected", endpoint))
        }
        s if s.is_server_error() => FetchError::TransientNetwork(format!("{}: {}", endpoint, s)),
        s => FetchError::InvalidResponse(format!("{}: unexpected status {}", endpoint, s)),
    }
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Reads the quota headers; all three must be present
fn parse_quota(headers: &HeaderMap) -> Option<QuotaSnapshot> {
    let remaining = header_f64(headers, "x-ratelimit-remaining")?;
    let used = header_f64(headers, "x-ratelimit-used")?;
    let reset = header_f64(headers, "x-ratelimit-reset")?;

    Some(QuotaSnapshot {
        remaining: remaining.max(0.0) as u32,
        used: used.max(0.0) as u32,
        reset_at: Utc::now() + chrono::Duration::milliseconds((reset.max(0.0) * 1000.0) as i64),
    })
}

/// Extracts the comment forest from a `/comments/{id}` response
fn comment_forest(response: &Value) -> Result<Vec<Value>, FetchError> {
    response
        .get(1)
        .and_then(|listing| listing.pointer("/data/children"))
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| FetchError::InvalidResponse("comment listing missing".to_string()))
}

fn expect_kind(thing: Value, kind: &str, what: &str) -> Result<Value, FetchError> {
    match thing.get("kind").and_then(Value::as_str) {
        Some(k) if k == kind => Ok(thing),
        _ => Err(FetchError::NotFound(what.to_string())),
    }
}

#[async_trait]
impl ResourceClient for RedditClient {
    async fn fetch_top_level(
        &self,
        community: &str,
        request: &ListingRequest,
    ) -> Result<CommunityBatch, FetchError> {
        let about = self.get_json(&format!("/r/{}/about", community), &[]).await?;
        let about = expect_kind(about, "t5", &format!("community {}", community))?;

        let limit = request.limit as usize;
        let endpoint = format!("/r/{}/{}", community, request.ordering.as_str());
        let mut submissions: Vec<Value> = Vec::with_capacity(limit);
        let mut after: Option<String> = None;

        while submissions.len() < limit {
            let page = (limit - submissions.len()).min(PAGE_SIZE);
            let mut query = vec![("limit", page.to_string())];
            if request.ordering == SubmissionOrdering::Top {
                query.push(("t", request.time_filter.as_str().to_string()));
            }
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let listing = self.get_json(&endpoint, &query).await?;
            let children = listing
                .pointer("/data/children")
                .and_then(Value::as_array)
                .ok_or_else(|| FetchError::InvalidResponse(format!("{}: not a listing", endpoint)))?;

            if children.is_empty() {
                break;
            }
            submissions.extend(
                children
                    .iter()
                    .filter(|c| c.get("kind").and_then(Value::as_str) == Some("t3"))
                    .cloned(),
            );

            after = listing
                .pointer("/data/after")
                .and_then(Value::as_str)
                .map(str::to_string);
            if after.is_none() {
                break;
            }
        }

        submissions.truncate(limit);
        debug!("{}: {} submissions", community, submissions.len());

        Ok(CommunityBatch {
            community: about,
            submissions,
        })
    }

    async fn fetch_children(
        &self,
        submission_id: &str,
        expansion_depth: u32,
    ) -> Result<Vec<Value>, FetchError> {
        let response = self
            .get_json(&format!("/comments/{}", submission_id), &[])
            .await?;
        let mut forest = comment_forest(&response)?;

        let mut expanded = 0;
        while expanded < expansion_depth {
            if !self.expand_once(submission_id, &mut forest).await? {
                break;
            }
            expanded += 1;
        }
        debug!(
            "{}: {} collapsed threads expanded",
            submission_id, expanded
        );

        prune_more(&mut forest);
        Ok(flatten(forest))
    }

    async fn fetch_author(&self, name: &str) -> Result<Value, FetchError> {
        let about = self.get_json(&format!("/user/{}/about", name), &[]).await?;
        expect_kind(about, "t2", &format!("author {}", name))
    }

    fn current_quota(&self) -> Option<QuotaSnapshot> {
        self.quota.lock().ok().and_then(|mut quota| quota.take())
    }
}
