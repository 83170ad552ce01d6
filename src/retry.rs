//! Generic bounded-retry policy with exponential backoff and jitter.
//!
//! Both network adapters (extraction and export) share this policy instead
//! of carrying ad hoc sleep loops. The policy distinguishes transient
//! failures (rate limits, 5xx, timeouts - worth retrying) from permanent
//! ones (auth errors, bad requests - fail fast) through the [`Transience`]
//! trait implemented by each adapter's error type.
//!
//! With the defaults (4 attempts, 500 ms base, 2× multiplier) the backoff
//! sequence is 500 ms → 1 s → 2 s. Jitter spreads concurrent retries so
//! several periods recovering from the same rate limit do not hammer the
//! endpoint in lockstep.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Whether an error is worth retrying.
pub trait Transience {
    fn is_transient(&self) -> bool;
}

/// Bounded exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be ≥ 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub multiplier: f64,
    /// Randomise each delay in `[0.5×, 1.5×]` of its nominal value.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Nominal delay before attempt `attempt` (1-based; attempt 1 has no
    /// delay), jitter applied when enabled.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let nominal =
            self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32 - 2);
        let ms = if self.jitter {
            nominal * (0.5 + fastrand::f64())
        } else {
            nominal
        };
        Duration::from_millis(ms as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. On exhaustion or a
    /// permanent error, returns the attempt count alongside the last error
    /// so callers can report how hard they tried.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, (u32, E)>
    where
        E: Transience + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err: Option<E> = None;
        for attempt in 1..=attempts {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                warn!("{}: retry {}/{} after {:?}", what, attempt, attempts, delay);
                sleep(delay).await;
            }
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    warn!("{}: attempt {} failed - {}", what, attempt, e);
                    last_err = Some(e);
                }
                Err(e) => {
                    warn!("{}: permanent failure on attempt {} - {}", what, attempt, e);
                    return Err((attempt, e));
                }
            }
        }
        let err = last_err.expect("at least one attempt ran");
        Err((attempts, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum FakeError {
        #[error("transient")]
        Transient,
        #[error("permanent")]
        Permanent,
    }

    impl Transience for FakeError {
        fn is_transient(&self) -> bool {
            matches!(self, FakeError::Transient)
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn delays_grow_exponentially_without_jitter() {
        let p = fast_policy();
        assert_eq!(p.delay_before(1), Duration::ZERO);
        assert_eq!(p.delay_before(2), Duration::from_millis(1));
        assert_eq!(p.delay_before(3), Duration::from_millis(2));
        assert_eq!(p.delay_before(4), Duration::from_millis(4));
    }

    #[test]
    fn jittered_delay_stays_within_band() {
        let p = RetryPolicy {
            jitter: true,
            base_delay: Duration::from_millis(100),
            ..fast_policy()
        };
        for _ in 0..50 {
            let d = p.delay_before(2).as_millis();
            assert!((50..=150).contains(&d), "delay {d}ms outside jitter band");
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Cell::new(0u32);
        let result = fast_policy()
            .run("test", |_| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(FakeError::Transient)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_short_circuits() {
        let calls = Cell::new(0u32);
        let result: Result<(), _> = fast_policy()
            .run("test", |_| {
                calls.set(calls.get() + 1);
                async { Err(FakeError::Permanent) }
            })
            .await;
        let (attempts, err) = result.unwrap_err();
        assert_eq!(attempts, 1);
        assert!(!err.is_transient());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let result: Result<(), _> = fast_policy()
            .run("test", |_| async { Err(FakeError::Transient) })
            .await;
        let (attempts, _) = result.unwrap_err();
        assert_eq!(attempts, 3);
    }
}
