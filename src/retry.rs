/// Centralized retry helper: every network call in the pipeline (RPC, oracle,
/// bus publish) goes through `retry_with_backoff` instead of hand-rolling its
/// own loop. Parameterized by the policy the caller needs rather than a
/// global default.
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self { max_attempts, initial_delay, multiplier, max_delay }
    }

    /// Fixed-step backoff (1s, 2s, 3s, ...) used by the backfill loop and the
    /// worker's transaction fetch, rather than exponential growth.
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self { max_attempts, initial_delay: step, multiplier: 1.0, max_delay: step * max_attempts }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

/// Default policy for the oracle client: initial 1s, x2, capped at 10s.
pub fn oracle_policy() -> RetryPolicy {
    RetryPolicy::new(5, Duration::from_secs(1), 2.0, Duration::from_secs(10))
}

/// Run `op` up to `policy.max_attempts` times, sleeping between attempts
/// according to `policy`, retrying only while `should_retry` returns true.
/// Returns the last error if every attempt is exhausted.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: RetryPolicy,
    should_retry: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !should_retry(&err) {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt - 1);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1), 1.0, Duration::from_millis(5));
        let result: Result<u32, &str> = retry_with_backoff(
            policy,
            |_| true,
            |_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err("not yet") } else { Ok(n) } }
            },
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_when_should_retry_is_false() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1), 1.0, Duration::from_millis(5));
        let result: Result<(), &str> =
            retry_with_backoff(policy, |_| false, |_attempt| async { Err("permanent") }).await;
        assert_eq!(result, Err("permanent"));
    }
}
