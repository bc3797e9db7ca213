use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Bounded retry with a linearly growing pause: after failed attempt `n`
/// the loop waits `n * base_delay` before trying again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Runs `op` until it succeeds or the policy runs out of attempts.
///
/// `op` receives the 1-based attempt number. The error of the final attempt
/// is returned unchanged. Every error is retried; see [`retry_when`] to stop
/// early on errors that cannot recover.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_when(policy, op, |_| true).await
}

/// Like [`retry`], but an error for which `retryable` returns `false` is
/// returned at once, without sleeping.
pub async fn retry_when<T, E, F, Fut, R>(
    policy: RetryPolicy,
    mut op: F,
    retryable: R,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => return Err(err),
            Err(err) if !retryable(&err) => {
                warn!(attempt, error = %err, "llm.retry.abort");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "llm.retry"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{retry, retry_when, RetryPolicy};

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[test]
    fn delay_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(3));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let result: Result<u32, String> = retry(instant_policy(3), |attempt| {
            calls += 1;
            async move {
                if attempt < 3 {
                    Err(format!("attempt {} failed", attempt))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn returns_last_error_when_exhausted() {
        let mut calls = 0;
        let result: Result<(), String> = retry(instant_policy(3), |attempt| {
            calls += 1;
            async move { Err(format!("attempt {} failed", attempt)) }
        })
        .await;
        assert_eq!(result, Err("attempt 3 failed".to_string()));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_linearly_between_attempts() {
        let started = Instant::now();
        let mut seen = Vec::new();
        let result: Result<(), String> = retry(RetryPolicy::default(), |attempt| {
            seen.push(started.elapsed());
            async move { Err(format!("attempt {} failed", attempt)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(
            seen,
            vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(3)]
        );
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn unretryable_error_returns_without_sleeping() {
        let started = Instant::now();
        let mut calls = 0;
        let result: Result<(), String> = retry_when(
            RetryPolicy::default(),
            |_| {
                calls += 1;
                async { Err("bad request".to_string()) }
            },
            |err: &String| !err.starts_with("bad"),
        )
        .await;
        assert_eq!(result, Err("bad request".to_string()));
        assert_eq!(calls, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn first_success_stops_the_loop() {
        let mut calls = 0;
        let result: Result<&str, String> = retry(instant_policy(3), |_| {
            calls += 1;
            async { Ok("done") }
        })
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls, 1);
    }
}
