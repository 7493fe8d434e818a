//! Remote-first calls with retry and a local fallback.
//!
//! Both upstream integrations (the CSV publisher and the geocoder) follow the
//! same shape: call the remote source, retry transient failures with
//! exponential back-off, and when the remote side is exhausted or throttling
//! us, answer from local data instead. [`FallbackStrategy`] captures that
//! shape once; callers supply the remote operation, the local operation, and
//! a classifier deciding what each error means.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// Fixed-count, increasing-delay retry schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total remote attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles for each later retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: Duration::from_secs(10),
        }
    }

    /// Policy that retries immediately (for tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to sleep after the `retry`-th failure (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Delay requested by a `Retry-After` header given in whole seconds.
///
/// HTTP-date values and garbage are ignored.
pub fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// True for statuses providers use to signal throttling (429 and the
/// non-standard 509 "bandwidth limit exceeded").
pub fn is_rate_limit_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 509)
}

/// What to do with a failed remote attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transient: try the remote again after back-off, if attempts remain.
    Retry,
    /// Stop calling the remote and consult the local source, optionally
    /// after waiting (e.g. for a `Retry-After` hint).
    Fallback { wait: Option<Duration> },
    /// Propagate the error unchanged. The local source is not consulted.
    Fail,
}

/// Where a successful answer came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Remote(T),
    Local(T),
}

impl<T> Outcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            Outcome::Remote(v) | Outcome::Local(v) => v,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Outcome::Local(_))
    }
}

/// Retry policy plus failure classifier.
#[derive(Debug, Clone)]
pub struct FallbackStrategy<C> {
    policy: RetryPolicy,
    classify: C,
}

impl<C> FallbackStrategy<C> {
    pub fn new(policy: RetryPolicy, classify: C) -> Self {
        Self { policy, classify }
    }

    /// Run `remote` under the retry policy, falling back to `local`.
    ///
    /// When the local source has no answer, the last remote error is
    /// returned so the root cause is preserved.
    pub async fn run<T, E, R, RFut, L, LFut>(
        &self,
        mut remote: R,
        local: L,
    ) -> Result<Outcome<T>, E>
    where
        C: Fn(&E) -> Disposition,
        E: Display,
        R: FnMut() -> RFut,
        RFut: Future<Output = Result<T, E>>,
        L: FnOnce() -> LFut,
        LFut: Future<Output = Option<T>>,
    {
        let mut attempt = 0u32;
        let err = loop {
            attempt += 1;
            let err = match remote().await {
                Ok(value) => return Ok(Outcome::Remote(value)),
                Err(err) => err,
            };

            match (self.classify)(&err) {
                Disposition::Fail => return Err(err),
                Disposition::Retry if attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient upstream error, retrying after back-off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Disposition::Retry => break err,
                Disposition::Fallback { wait } => {
                    if let Some(wait) = wait.filter(|w| !w.is_zero()) {
                        info!(wait_secs = wait.as_secs(), "waiting before local fallback");
                        tokio::time::sleep(wait).await;
                    }
                    break err;
                }
            }
        };

        warn!(attempts = attempt, error = %err, "remote source failed, trying local fallback");
        match local().await {
            Some(value) => Ok(Outcome::Local(value)),
            None => Err(err),
        }
    }
}
