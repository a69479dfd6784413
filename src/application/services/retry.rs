//! Bounded fixed-delay retry for resource loads.
//!
//! A [`RetryState`] lives for one logical load lifecycle: it counts retries
//! across calls and only resets when the owner asks (URL change or manual
//! reload). Once the budget is spent, failures surface immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Default number of automatic retries after the first failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Fixed wait before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// Retry counter for one load lifecycle.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    retries: u32,
}

impl RetryState {
    /// Creates a fresh counter.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy, retries: 0 }
    }

    /// Returns the retries used so far.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Returns true once no retries are left.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.retries >= self.policy.max_retries
    }

    /// Resets the counter to zero.
    pub fn reset(&mut self) {
        self.retries = 0;
    }

    /// Runs `op`, retrying failures while budget remains.
    ///
    /// `before_retry` is called with the retry number (starting at 1) and
    /// the failure, before the delay.
    ///
    /// # Errors
    /// Returns the last failure once the budget is spent.
    pub async fn run<T, E, F, Fut, H>(&mut self, mut op: F, mut before_retry: H) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        H: FnMut(u32, &E),
    {
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !self.is_exhausted() => {
                    self.retries += 1;
                    warn!(
                        retry = self.retries,
                        max_retries = self.policy.max_retries,
                        delay_ms = self.policy.delay.as_millis(),
                        error = %e,
                        "Load failed, retrying"
                    );
                    before_retry(self.retries, &e);
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_runs_max_retries_plus_one() {
        let attempts = Cell::new(0u32);
        let mut state = RetryState::new(RetryPolicy::default());
        let started = tokio::time::Instant::now();

        let result: Result<(), String> = state
            .run(
                || {
                    attempts.set(attempts.get() + 1);
                    async { Err("boom".to_string()) }
                },
                |_, _| {},
            )
            .await;

        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(attempts.get(), 4);
        assert!(state.is_exhausted());
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_state_fails_without_retry_until_reset() {
        let attempts = Cell::new(0u32);
        let mut state = RetryState::new(RetryPolicy::new(2, Duration::from_millis(10)));
        let op = || {
            attempts.set(attempts.get() + 1);
            async { Err::<(), _>("down") }
        };

        let _ = state.run(op, |_, _| {}).await;
        assert_eq!(attempts.get(), 3);

        let _ = state.run(op, |_, _| {}).await;
        assert_eq!(attempts.get(), 4);

        state.reset();
        assert_eq!(state.retries(), 0);
        let _ = state.run(op, |_, _| {}).await;
        assert_eq!(attempts.get(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let attempts = Cell::new(0u32);
        let seen = Cell::new(0u32);
        let mut state = RetryState::new(RetryPolicy::default());

        let result = state
            .run(
                || {
                    let n = attempts.get() + 1;
                    attempts.set(n);
                    async move { if n < 3 { Err("flaky") } else { Ok(n) } }
                },
                |retry, _| seen.set(retry),
            )
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(seen.get(), 2);
        assert_eq!(state.retries(), 2);
    }

    #[tokio::test]
    async fn test_disabled_policy_single_attempt() {
        let attempts = Cell::new(0u32);
        let mut state = RetryState::new(RetryPolicy::disabled());

        let result: Result<(), &str> = state
            .run(
                || {
                    attempts.set(attempts.get() + 1);
                    async { Err("nope") }
                },
                |_, _| {},
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }
}
