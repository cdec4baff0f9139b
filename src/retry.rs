// 🔁 Retry policy shared by both providers
//
// Attempts are capped at MAX_ATTEMPTS no matter what the config says.
// Backoff grows geometrically between attempts; every attempt gets the same
// per-attempt timeout. Sources apply it to their own request and
// `with_deadline` stops waiting on any source that overruns it.

use crate::error::UpstreamUnavailable;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub per_attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, per_attempt_timeout: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
            initial_backoff,
            multiplier: 2,
            per_attempt_timeout,
        }
    }

    /// Single attempt, no sleeping. Used for offline runs and tests.
    pub fn no_retry(per_attempt_timeout: Duration) -> Self {
        RetryPolicy::new(1, Duration::ZERO, per_attempt_timeout)
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Delay after the given failed attempt (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.initial_backoff.saturating_mul(factor)
    }

    /// Full backoff schedule: one entry per gap between attempts
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.backoff_after(a)).collect()
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. `op` receives the attempt number and the timeout
    /// to apply to that attempt.
    pub fn run<T>(
        &self,
        source: &str,
        mut op: impl FnMut(u32, Duration) -> Result<T, UpstreamUnavailable>,
    ) -> Result<T, UpstreamUnavailable> {
        let attempts = self.max_attempts.clamp(1, MAX_ATTEMPTS);
        let mut attempt = 1;

        loop {
            match op(attempt, self.per_attempt_timeout) {
                Ok(value) => {
                    debug!(source, attempt, "live lookup succeeded");
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.backoff_after(attempt);
                    warn!(
                        source,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "live lookup failed, retrying"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => {
                    debug!(source, attempt, error = %err, "live lookup gave up");
                    return Err(err);
                }
            }
        }
    }
}

/// Run one attempt on its own thread and give up waiting after `timeout`.
/// An overrunning attempt is detached and its result discarded. A panic
/// inside the attempt is re-raised on the calling thread.
pub fn with_deadline<T, F>(timeout: Duration, op: F) -> Result<T, UpstreamUnavailable>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, UpstreamUnavailable> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("upstream-attempt".to_string())
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(op));
            let _ = tx.send(outcome);
        })
        .map_err(|e| UpstreamUnavailable::Transport(format!("failed to start attempt: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(result)) => result,
        Ok(Err(payload)) => panic::resume_unwind(payload),
        Err(RecvTimeoutError::Timeout) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "attempt overran its deadline");
            Err(UpstreamUnavailable::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(UpstreamUnavailable::Transport(
            "attempt ended without a result".to_string(),
        )),
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(MAX_ATTEMPTS, Duration::from_millis(500), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO, Duration::from_millis(50))
    }

    #[test]
    fn test_attempts_are_capped() {
        let policy = RetryPolicy::new(10, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, MAX_ATTEMPTS);

        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_backoff_schedule_increases() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(30));
        assert_eq!(
            policy.schedule(),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[test]
    fn test_retries_transport_errors_until_exhausted() {
        let mut calls = 0;
        let result: Result<(), _> = fast_policy(3).run("test", |_, _| {
            calls += 1;
            Err(UpstreamUnavailable::Transport("connection reset".into()))
        });

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_stops_on_non_retryable_error() {
        let mut calls = 0;
        let result: Result<(), _> = fast_policy(3).run("test", |_, _| {
            calls += 1;
            Err(UpstreamUnavailable::Status(404))
        });

        assert_eq!(result, Err(UpstreamUnavailable::Status(404)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_succeeds_on_later_attempt_with_same_timeout() {
        let mut seen = Vec::new();
        let result = fast_policy(3).run("test", |attempt, timeout| {
            seen.push((attempt, timeout));
            if attempt < 2 {
                Err(UpstreamUnavailable::Timeout(timeout))
            } else {
                Ok("record")
            }
        });

        assert_eq!(result, Ok("record"));
        assert_eq!(
            seen,
            vec![(1, Duration::from_millis(50)), (2, Duration::from_millis(50))]
        );
    }

    #[test]
    fn test_deadline_cuts_off_slow_attempt() {
        let started = std::time::Instant::now();
        let result: Result<(), _> = with_deadline(Duration::from_millis(50), || {
            thread::sleep(Duration::from_secs(3));
            Ok(())
        });

        assert_eq!(result, Err(UpstreamUnavailable::Timeout(Duration::from_millis(50))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_deadline_passes_through_fast_attempt() {
        let ok = with_deadline(Duration::from_secs(2), || Ok(7));
        assert_eq!(ok, Ok(7));

        let err: Result<(), _> =
            with_deadline(Duration::from_secs(2), || Err(UpstreamUnavailable::Status(503)));
        assert_eq!(err, Err(UpstreamUnavailable::Status(503)));
    }

    #[test]
    fn test_deadline_reraises_panics() {
        let caught = panic::catch_unwind(|| {
            with_deadline::<(), _>(Duration::from_secs(2), || panic!("source bug"))
        });
        assert!(caught.is_err());
    }
}
