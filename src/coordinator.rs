/// Mode Coordinator (C6).
///
/// Decides, once at startup, whether the pipeline needs to backfill
/// historical signatures before switching to the realtime subscription, or
/// whether the target transaction count is already met and it can go
/// straight to realtime. Drives an explicit state machine rather than
/// branching ad hoc so the transition points are easy to reason about and
/// to log.
use crate::analytics::AnalyticsStore;
use crate::logger::{self, LogTag};
use crate::store::IdempotencyStore;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Init,
    CheckCount,
    Backfill,
    Realtime,
    Shutdown,
}

pub struct ModeCoordinator {
    store: Arc<IdempotencyStore>,
    analytics: Arc<AnalyticsStore>,
    program_id: String,
    target_transaction_count: u64,
}

impl ModeCoordinator {
    pub fn new(store: Arc<IdempotencyStore>, analytics: Arc<AnalyticsStore>, program_id: String, target_transaction_count: u64) -> Self {
        Self { store, analytics, program_id, target_transaction_count }
    }

    /// Reads the current processed count, preferring the Redis counter and
    /// falling back to a distinct-signature count against the analytics
    /// store when the counter key hasn't been created yet.
    pub async fn processed_count(&self) -> u64 {
        match self.store.get_processed_count(&self.program_id).await {
            Ok(count) if count > 0 => return count as u64,
            Ok(_) => {}
            Err(e) => {
                logger::warning(LogTag::Coordinator, &format!("failed to read processed count from store: {}", e));
            }
        }

        match self.analytics.count_distinct_signatures(&self.program_id).await {
            Ok(count) => count,
            Err(e) => {
                logger::warning(LogTag::Coordinator, &format!("failed to read fallback count from analytics store: {}", e));
                0
            }
        }
    }

    /// Decides the next state out of `CheckCount`: `Backfill` if the target
    /// hasn't been reached yet, `Realtime` otherwise.
    pub async fn decide(&self) -> CoordinatorState {
        let count = self.processed_count().await;
        if count >= self.target_transaction_count {
            logger::info(
                LogTag::Coordinator,
                &format!("processed count {} already meets target {}, skipping backfill", count, self.target_transaction_count),
            );
            CoordinatorState::Realtime
        } else {
            logger::info(
                LogTag::Coordinator,
                &format!("processed count {} below target {}, starting backfill", count, self.target_transaction_count),
            );
            CoordinatorState::Backfill
        }
    }

    /// Drives the `Backfill` branch's transition: runs `backfill` to
    /// completion, then unconditionally hands off to `realtime` unless
    /// `shutdown` fires first. Awaiting the two sequentially (rather than
    /// racing or spawning them independently) is what guarantees realtime
    /// never comes up while backfill is still running.
    pub async fn run_backfill_then_realtime<BFut, RFut>(
        shutdown: Arc<Notify>,
        backfill: impl FnOnce() -> BFut,
        realtime: impl FnOnce() -> RFut,
    ) where
        BFut: Future<Output = ()>,
        RFut: Future<Output = ()>,
    {
        let shutdown_signal = shutdown.notified();
        tokio::pin!(shutdown_signal);

        tokio::select! {
            biased;
            _ = &mut shutdown_signal => {
                logger::info(
                    LogTag::Coordinator,
                    "shutdown received before backfill completed, not transitioning to realtime",
                );
                return;
            }
            _ = backfill() => {}
        }

        logger::info(LogTag::Coordinator, "backfill finished, transitioning to realtime");
        realtime().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_states_are_distinct() {
        assert_ne!(CoordinatorState::Init, CoordinatorState::CheckCount);
        assert_ne!(CoordinatorState::Backfill, CoordinatorState::Realtime);
        assert_eq!(CoordinatorState::Shutdown, CoordinatorState::Shutdown);
    }

    #[tokio::test]
    async fn backfill_completes_before_realtime_starts() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Mutex;

        let shutdown = Arc::new(Notify::new());
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let backfill_running = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));

        let order_for_backfill = order.clone();
        let running_for_backfill = backfill_running.clone();
        let backfill = || async move {
            running_for_backfill.store(true, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            order_for_backfill.lock().unwrap().push("backfill");
            running_for_backfill.store(false, Ordering::SeqCst);
        };

        let order_for_realtime = order.clone();
        let running_for_realtime = backfill_running.clone();
        let overlapped_for_realtime = overlapped.clone();
        let realtime = || async move {
            if running_for_realtime.load(Ordering::SeqCst) {
                overlapped_for_realtime.store(true, Ordering::SeqCst);
            }
            order_for_realtime.lock().unwrap().push("realtime");
        };

        ModeCoordinator::run_backfill_then_realtime(shutdown, backfill, realtime).await;

        assert_eq!(*order.lock().unwrap(), vec!["backfill", "realtime"]);
        assert!(!overlapped.load(Ordering::SeqCst), "realtime started while backfill was still running");
    }

    #[tokio::test]
    async fn shutdown_before_backfill_completes_skips_realtime() {
        let shutdown = Arc::new(Notify::new());
        let realtime_started = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let shutdown_for_backfill = shutdown.clone();
        let backfill = || async move {
            // Never resolves on its own; the shutdown notification wins the select.
            shutdown_for_backfill.notify_waiters();
            std::future::pending::<()>().await;
        };

        let flag = realtime_started.clone();
        let realtime = || async move {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        };

        ModeCoordinator::run_backfill_then_realtime(shutdown, backfill, realtime).await;

        assert!(!realtime_started.load(std::sync::atomic::Ordering::SeqCst));
    }
}
