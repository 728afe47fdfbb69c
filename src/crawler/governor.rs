//! Rate governor
//!
//! Gates every fetch against the quota the upstream reports. The governor does
//! not model a refill rate; it reacts to the most recent `remaining`/`reset_at`
//! pair:
//! - above the reserve, fetches proceed and the local count is decremented
//! - at or below the reserve, fetches wait until the reset time
//! - once the reset time passes, exactly one probe fetch is let through and
//!   everyone else waits until that fetch reports fresh quota
//!
//! Two gates share that state. [`RateGovernor::acquire`] claims one request
//! and is called before every HTTP send. [`RateGovernor::await_window`] only
//! holds a resource back while the window is exhausted, without claiming.

use crate::client::{FetchError, QuotaSnapshot};
use crate::config::GovernorConfig;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often callers re-check while a probe fetch is outstanding
const PROBE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Outcome of consulting the governor before a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernorDecision {
    Proceed,
    Wait(Duration),
}

#[derive(Debug, Default)]
struct QuotaState {
    /// `None` until the upstream has reported a quota
    remaining: Option<u32>,
    reset_at: Option<DateTime<Utc>>,
    probe_outstanding: bool,
    /// Gate calls that had to sleep
    waits: u64,
}

/// Shared gate consulted before and after every fetch
///
/// All state sits behind one mutex so the proceed/wait decision and the
/// quota update are each atomic, even with concurrent fetchers.
#[derive(Debug)]
pub struct RateGovernor {
    reserve: u32,
    fallback_wait: Duration,
    max_rate_limit_waits: u32,
    state: Mutex<QuotaState>,
}

impl RateGovernor {
    pub fn new(config: &GovernorConfig) -> Self {
        Self {
            reserve: config.reserve,
            fallback_wait: Duration::from_secs(config.fallback_wait_secs),
            max_rate_limit_waits: config.max_rate_limit_waits,
            state: Mutex::new(QuotaState::default()),
        }
    }

    /// Creates a governor that waits once `remaining` drops to `reserve`
    pub fn with_reserve(reserve: u32, fallback_wait: Duration) -> Self {
        Self::new(&GovernorConfig {
            reserve,
            fallback_wait_secs: fallback_wait.as_secs(),
            ..GovernorConfig::default()
        })
    }

    /// How many rate-limit rejections one request may wait out
    pub fn max_rate_limit_waits(&self) -> u32 {
        self.max_rate_limit_waits
    }

    fn state(&self) -> MutexGuard<'_, QuotaState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn before_fetch(&self) -> GovernorDecision {
        self.before_fetch_at(Utc::now())
    }

    /// Decides whether a fetch may start at `now`
    pub fn before_fetch_at(&self, now: DateTime<Utc>) -> GovernorDecision {
        let mut state = self.state();

        match state.remaining {
            None => GovernorDecision::Proceed,
            Some(remaining) if remaining > self.reserve => {
                state.remaining = Some(remaining - 1);
                GovernorDecision::Proceed
            }
            Some(_) => {
                let reset_at = state.reset_at.unwrap_or(now);
                if now < reset_at {
                    let wait = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
                    return GovernorDecision::Wait(wait);
                }

                if state.probe_outstanding {
                    GovernorDecision::Wait(PROBE_POLL_INTERVAL)
                } else {
                    state.probe_outstanding = true;
                    GovernorDecision::Proceed
                }
            }
        }
    }

    /// Decides whether a resource may start at `now`, without claiming quota
    pub fn window_at(&self, now: DateTime<Utc>) -> GovernorDecision {
        let state = self.state();

        match (state.remaining, state.reset_at) {
            (Some(remaining), Some(reset_at)) if remaining <= self.reserve && now < reset_at => {
                GovernorDecision::Wait((reset_at - now).to_std().unwrap_or(Duration::ZERO))
            }
            _ => GovernorDecision::Proceed,
        }
    }

    /// Records the quota reported after a fetch
    ///
    /// A fetch whose responses carried no quota clears a pending probe and
    /// leaves the last known quota in place.
    pub fn after_fetch(&self, quota: Option<QuotaSnapshot>) {
        let mut state = self.state();
        state.probe_outstanding = false;

        if let Some(snapshot) = quota {
            state.remaining = Some(snapshot.remaining);
            state.reset_at = Some(snapshot.reset_at);
        } else if state.remaining.map_or(false, |r| r <= self.reserve)
            && state.reset_at.map_or(true, |reset| reset <= Utc::now())
        {
            // The window has rolled over without a fresh report; stop gating
            state.remaining = None;
        }
    }

    /// Treats an explicit rate-limit response as an exhausted quota
    pub fn note_rate_limited(&self, retry_after: Option<Duration>) {
        self.note_rate_limited_at(retry_after, Utc::now());
    }

    pub fn note_rate_limited_at(&self, retry_after: Option<Duration>, now: DateTime<Utc>) {
        let wait = retry_after.unwrap_or(self.fallback_wait);
        let wait = chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::zero());

        let mut state = self.state();
        state.remaining = Some(0);
        state.reset_at = Some(now + wait);
        state.probe_outstanding = false;
    }

    /// Waits until one request may be sent, and claims it
    ///
    /// # Returns
    ///
    /// * `Ok(Duration)` - Total time spent waiting (zero when no wait was needed)
    /// * `Err(FetchError::Cancelled)` - The run was cancelled while waiting
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Duration, FetchError> {
        self.gate(cancel, RateGovernor::before_fetch).await
    }

    /// Waits while the quota window is exhausted
    ///
    /// Nothing is claimed: requests made by the resource fetch that follows
    /// still go through [`acquire`](Self::acquire).
    pub async fn await_window(&self, cancel: &CancellationToken) -> Result<Duration, FetchError> {
        self.gate(cancel, |governor| governor.window_at(Utc::now())).await
    }

    async fn gate<F>(&self, cancel: &CancellationToken, decide: F) -> Result<Duration, FetchError>
    where
        F: Fn(&Self) -> GovernorDecision,
    {
        let mut waited = Duration::ZERO;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            match decide(self) {
                GovernorDecision::Proceed => {
                    if !waited.is_zero() {
                        self.state().waits += 1;
                    }
                    return Ok(waited);
                }
                GovernorDecision::Wait(duration) => {
                    debug!("Quota exhausted, waiting {:?}", duration);
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(duration) => {}
                    }
                    waited += duration;
                }
            }
        }
    }

    /// Number of gate calls that had to wait for the quota window
    pub fn wait_count(&self) -> u64 {
        self.state().waits
    }
}
