//! Timing primitives for Scorelink.
//!
//! Three independent pieces, all driven by Tokio's clock so tests can run
//! under `start_paused`:
//!
//! - [`ReconnectPolicy`] + [`Backoff`]: exponential delay between
//!   reconnect attempts with a hard attempt cap.
//! - [`RefreshPolicy`] + [`RefreshTicker`]: the credential-expiry check
//!   cadence and the "is renewal due" rule.
//! - [`TaskHandle`]: an explicit handle for a spawned background loop.
//!
//! # Integration
//!
//! The refresh ticker sits inside the scheduler's `tokio::select!` loop:
//!
//! ```ignore
//! let mut ticker = RefreshTicker::new(policy);
//! loop {
//!     tokio::select! {
//!         _ = session.changed() => { /* stop when signed out */ }
//!         _ = ticker.wait_for_tick() => { refresh_if_needed().await; }
//!     }
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Reconnect backoff
// ---------------------------------------------------------------------------

/// How reconnect attempts are spaced and when they stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry. Doubles with every further failure.
    pub base_delay: Duration,
    /// Once this many consecutive attempts have failed, no retry is
    /// scheduled.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Upper bound on `max_attempts`. Past this the doubled delay stops
    /// being meaningful.
    pub const MAX_ATTEMPTS_LIMIT: u32 = 16;

    /// Clamp out-of-range values so the policy is safe to use.
    ///
    /// - `base_delay` of zero is raised to 1 ms (a zero delay would spin).
    /// - `max_attempts` clamped to `1..=MAX_ATTEMPTS_LIMIT`.
    pub fn validated(mut self) -> Self {
        if self.base_delay.is_zero() {
            warn!("reconnect base_delay is zero, raising to 1ms");
            self.base_delay = Duration::from_millis(1);
        }
        if self.max_attempts == 0 || self.max_attempts > Self::MAX_ATTEMPTS_LIMIT {
            let clamped = self.max_attempts.clamp(1, Self::MAX_ATTEMPTS_LIMIT);
            warn!(
                requested = self.max_attempts,
                clamped, "reconnect max_attempts out of range, clamping"
            );
            self.max_attempts = clamped;
        }
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// `base × 2^(attempt − 1)`. Returns `None` once `attempt` reaches
    /// `max_attempts`: the caller gives up instead of retrying.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1)?;
        self.base_delay.checked_mul(factor)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`. `attempt` is the number of the attempt
    /// that just failed.
    Retry { attempt: u32, delay: Duration },
    /// The cap was reached; stop retrying.
    Exhausted { attempts: u32 },
}

/// Consecutive-failure counter for one connection.
///
/// Reset on a successful open, on a caller disconnect, and on a manual
/// connect from a closed state.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy: policy.validated(),
            attempts: 0,
        }
    }

    /// Count one more failed attempt and decide whether to retry.
    pub fn record_failure(&mut self) -> RetryDecision {
        self.attempts = self.attempts.saturating_add(1);
        match self.policy.delay_for(self.attempts) {
            Some(delay) => {
                trace!(attempt = self.attempts, ?delay, "retry scheduled");
                RetryDecision::Retry {
                    attempt: self.attempts,
                    delay,
                }
            }
            None => RetryDecision::Exhausted {
                attempts: self.attempts,
            },
        }
    }

    pub fn reset(&mut self) {
        if self.attempts != 0 {
            trace!(attempts = self.attempts, "backoff reset");
        }
        self.attempts = 0;
    }

    /// Failed attempts since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

// ---------------------------------------------------------------------------
// Credential refresh cadence
// ---------------------------------------------------------------------------

/// When the credential is checked and how early it is renewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Time between expiry checks.
    pub interval: Duration,
    /// Renew once less than this much validity remains.
    pub safety_margin: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            safety_margin: Duration::from_secs(5 * 60),
        }
    }
}

impl RefreshPolicy {
    /// Shortest accepted check interval.
    pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

    /// Clamp out-of-range values so the policy is safe to use.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                requested = ?self.interval,
                min = ?Self::MIN_INTERVAL,
                "refresh interval too short, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }

    /// `true` when a credential with `remaining` validity should be renewed.
    ///
    /// Already-expired credentials (negative `remaining`) are always due.
    pub fn renewal_due(&self, remaining: TimeDelta) -> bool {
        let margin = TimeDelta::from_std(self.safety_margin).unwrap_or(TimeDelta::MAX);
        remaining < margin
    }
}

/// Fires once immediately, then every `interval`.
///
/// Missed ticks are skipped rather than bursted, so a process that slept
/// through several intervals checks the credential once on wake.
pub struct RefreshTicker {
    interval: Interval,
    tick_count: u64,
}

impl RefreshTicker {
    pub fn new(policy: RefreshPolicy) -> Self {
        let policy = policy.validated();
        let mut interval = time::interval(policy.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(interval = ?policy.interval, "refresh ticker created");
        Self {
            interval,
            tick_count: 0,
        }
    }

    /// Wait for the next check. The first call resolves immediately.
    pub async fn wait_for_tick(&mut self) -> u64 {
        self.interval.tick().await;
        self.tick_count += 1;
        trace!(tick = self.tick_count, "refresh tick");
        self.tick_count
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}

// ---------------------------------------------------------------------------
// Task handle
// ---------------------------------------------------------------------------

/// Handle to a spawned background loop.
///
/// [`cancel`](Self::cancel) takes the handle by value, so a loop can be
/// cancelled at most once per spawn. Dropping the handle detaches the task
/// without stopping it.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawns `future` on the current runtime.
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, "task started");
        Self {
            name,
            join: tokio::spawn(future),
        }
    }

    /// Stops the task. Returns once the runtime has dropped it.
    pub async fn cancel(self) {
        self.join.abort();
        // Cancelled or already finished are both fine here.
        let _ = self.join.await;
        debug!(task = self.name, "task cancelled");
    }

    /// `true` once the task has exited on its own or been aborted.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
