use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Single-flight rate limiter: a FIFO-serialized gate where only one
/// operation runs at a time and consecutive runs are spaced by at least
/// `min_interval`. Used by the price oracle client (C2) to guarantee a
/// minimum inter-request delay to the upstream price API regardless of how
/// many callers are waiting.
pub struct SingleFlightLimiter {
    last_run: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl SingleFlightLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { last_run: Mutex::new(None), min_interval }
    }

    /// Run `op`, holding the gate for the whole call so no other caller can
    /// enter concurrently, and waiting first if the previous run was too
    /// recent.
    pub async fn run<T, F, Fut>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last_run = self.last_run.lock().await;
        if let Some(prev) = *last_run {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        let result = op().await;
        *last_run = Some(Instant::now());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn serializes_and_spaces_calls() {
        let limiter = Arc::new(SingleFlightLimiter::new(Duration::from_millis(20)));
        let counter = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run(|| async {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        // Three calls spaced by >= 20ms each should take at least ~40ms total.
        assert!(start.elapsed() >= Duration::from_millis(35));
    }
}
