//! Concrete `Service` wrappers around the pipeline's core components.
//!
//! Each component (backfill, realtime, enrichment worker, health surface)
//! already knows how to run itself; these wrappers just adapt that to the
//! `ServiceManager`'s start/stop/health lifecycle.

use crate::analytics::AnalyticsStore;
use crate::backfill::BackfillIndexer;
use crate::bus::TransactionBus;
use crate::coordinator::ModeCoordinator;
use crate::logger::{self, LogTag};
use crate::oracle::PriceOracleClient;
use crate::realtime::RealtimeIndexer;
use crate::rpc::client::RpcClient;
use crate::services::{Service, ServiceHealth};
use crate::store::IdempotencyStore;
use crate::worker::EnrichmentWorker;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Walks historical signatures for the configured program until the
/// processed-row target is reached or the chain is exhausted.
pub struct BackfillService {
    rpc: Arc<RpcClient>,
    bus: Arc<TransactionBus>,
    store: Arc<IdempotencyStore>,
    program_id: String,
    batch_size: usize,
    target_transaction_count: u64,
}

impl BackfillService {
    pub fn new(
        rpc: Arc<RpcClient>,
        bus: Arc<TransactionBus>,
        store: Arc<IdempotencyStore>,
        program_id: String,
        batch_size: usize,
        target_transaction_count: u64,
    ) -> Self {
        Self { rpc, bus, store, program_id, batch_size, target_transaction_count }
    }
}

#[async_trait]
impl Service for BackfillService {
    fn name(&self) -> &'static str {
        "backfill"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn start(&mut self, _shutdown: Arc<Notify>) -> Result<Vec<JoinHandle<()>>, String> {
        let indexer = BackfillIndexer::new(
            self.rpc.clone(),
            self.bus.clone(),
            self.store.clone(),
            self.program_id.clone(),
            self.batch_size,
            self.target_transaction_count,
        );

        let handle = tokio::spawn(async move {
            match indexer.run(None).await {
                Ok(report) => logger::info(
                    LogTag::Backfill,
                    &format!(
                        "backfill finished: {} batches, {} signatures seen, {} published ({:.1}/s)",
                        report.batches,
                        report.signatures_seen,
                        report.signatures_published,
                        report.throughput_per_sec()
                    ),
                ),
                Err(e) => logger::error(LogTag::Backfill, &format!("backfill run failed: {}", e)),
            }
        });

        Ok(vec![handle])
    }

    async fn health(&self) -> ServiceHealth {
        ServiceHealth::Healthy
    }
}

/// Subscribes to `logsSubscribe` notifications for the configured program
/// and forwards new signatures onto the bus as they happen.
pub struct RealtimeService {
    rpc_http_url: String,
    rpc_wss_url: Option<String>,
    program_id: String,
    bus: Arc<TransactionBus>,
    store: Arc<IdempotencyStore>,
}

impl RealtimeService {
    pub fn new(
        rpc_http_url: String,
        rpc_wss_url: Option<String>,
        program_id: String,
        bus: Arc<TransactionBus>,
        store: Arc<IdempotencyStore>,
    ) -> Self {
        Self { rpc_http_url, rpc_wss_url, program_id, bus, store }
    }
}

#[async_trait]
impl Service for RealtimeService {
    fn name(&self) -> &'static str {
        "realtime"
    }

    fn priority(&self) -> i32 {
        21
    }

    async fn start(&mut self, shutdown: Arc<Notify>) -> Result<Vec<JoinHandle<()>>, String> {
        let indexer = RealtimeIndexer::new(
            &self.rpc_http_url,
            self.rpc_wss_url.as_deref(),
            self.program_id.clone(),
            self.bus.clone(),
            self.store.clone(),
        )
        .map_err(|e| e.to_string())?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            shutdown.notified().await;
            let _ = shutdown_tx.send(true);
        });

        let handle = tokio::spawn(async move {
            if let Err(e) = indexer.run(shutdown_rx).await {
                logger::error(LogTag::Realtime, &format!("realtime indexer stopped: {}", e));
            }
        });

        Ok(vec![handle])
    }

    async fn health(&self) -> ServiceHealth {
        ServiceHealth::Healthy
    }
}

/// Drives backfill to completion and then unconditionally hands off to the
/// realtime indexer (C6), unless shutdown arrives first. Kept as a single
/// service rather than two independently-scheduled ones, since the handoff
/// has to happen sequentially and `ServiceManager` has no API to register a
/// new service once `start_all` has already run.
pub struct IndexerService {
    rpc: Arc<RpcClient>,
    bus: Arc<TransactionBus>,
    store: Arc<IdempotencyStore>,
    program_id: String,
    batch_size: usize,
    target_transaction_count: u64,
    rpc_http_url: String,
    rpc_wss_url: Option<String>,
}

impl IndexerService {
    pub fn new(
        rpc: Arc<RpcClient>,
        bus: Arc<TransactionBus>,
        store: Arc<IdempotencyStore>,
        program_id: String,
        batch_size: usize,
        target_transaction_count: u64,
        rpc_http_url: String,
        rpc_wss_url: Option<String>,
    ) -> Self {
        Self {
            rpc,
            bus,
            store,
            program_id,
            batch_size,
            target_transaction_count,
            rpc_http_url,
            rpc_wss_url,
        }
    }
}

#[async_trait]
impl Service for IndexerService {
    fn name(&self) -> &'static str {
        "indexer"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn start(&mut self, shutdown: Arc<Notify>) -> Result<Vec<JoinHandle<()>>, String> {
        let backfill_indexer = BackfillIndexer::new(
            self.rpc.clone(),
            self.bus.clone(),
            self.store.clone(),
            self.program_id.clone(),
            self.batch_size,
            self.target_transaction_count,
        );

        let realtime_indexer = RealtimeIndexer::new(
            &self.rpc_http_url,
            self.rpc_wss_url.as_deref(),
            self.program_id.clone(),
            self.bus.clone(),
            self.store.clone(),
        )
        .map_err(|e| e.to_string())?;

        let handle = tokio::spawn(async move {
            let backfill = || async move {
                match backfill_indexer.run(None).await {
                    Ok(report) => logger::info(
                        LogTag::Backfill,
                        &format!(
                            "backfill finished: {} batches, {} signatures seen, {} published ({:.1}/s)",
                            report.batches,
                            report.signatures_seen,
                            report.signatures_published,
                            report.throughput_per_sec()
                        ),
                    ),
                    Err(e) => logger::error(LogTag::Backfill, &format!("backfill run failed: {}", e)),
                }
            };

            let (realtime_shutdown_tx, realtime_shutdown_rx) = tokio::sync::watch::channel(false);
            let realtime_shutdown = shutdown.clone();
            tokio::spawn(async move {
                realtime_shutdown.notified().await;
                let _ = realtime_shutdown_tx.send(true);
            });

            let realtime = || async move {
                if let Err(e) = realtime_indexer.run(realtime_shutdown_rx).await {
                    logger::error(LogTag::Realtime, &format!("realtime indexer stopped: {}", e));
                }
            };

            ModeCoordinator::run_backfill_then_realtime(shutdown, backfill, realtime).await;
        });

        Ok(vec![handle])
    }

    async fn health(&self) -> ServiceHealth {
        ServiceHealth::Healthy
    }
}

/// Runs `concurrency` independent consumer loops against the transaction
/// bus, each draining messages through an `EnrichmentWorker`.
pub struct WorkerService {
    rpc: Arc<RpcClient>,
    analytics: Arc<AnalyticsStore>,
    store: Arc<IdempotencyStore>,
    oracle: Arc<PriceOracleClient>,
    bus: Arc<TransactionBus>,
    concurrency: u16,
    max_retries: u32,
}

impl WorkerService {
    pub fn new(
        rpc: Arc<RpcClient>,
        analytics: Arc<AnalyticsStore>,
        store: Arc<IdempotencyStore>,
        oracle: Arc<PriceOracleClient>,
        bus: Arc<TransactionBus>,
        concurrency: u16,
        max_retries: u32,
    ) -> Self {
        Self { rpc, analytics, store, oracle, bus, concurrency, max_retries }
    }
}

#[async_trait]
impl Service for WorkerService {
    fn name(&self) -> &'static str {
        "worker"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }

    async fn start(&mut self, shutdown: Arc<Notify>) -> Result<Vec<JoinHandle<()>>, String> {
        let mut handles = Vec::with_capacity(self.concurrency as usize);

        for worker_index in 0..self.concurrency {
            let worker = Arc::new(EnrichmentWorker::new(
                self.rpc.clone(),
                self.analytics.clone(),
                self.store.clone(),
                self.oracle.clone(),
            ));
            let bus = self.bus.clone();
            let max_retries = self.max_retries;
            let shutdown = shutdown.clone();

            let consumer_tag = format!("dln-worker-{}", worker_index);

            let handle = tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown.notified() => {
                        logger::info(LogTag::Worker, &format!("worker {} shutting down", worker_index));
                    }
                    result = bus.consume(&consumer_tag, max_retries, {
                        let worker = worker.clone();
                        move |msg| {
                            let worker = worker.clone();
                            async move { worker.handle(msg).await }
                        }
                    }) => {
                        if let Err(e) = result {
                            logger::error(
                                LogTag::Worker,
                                &format!("worker {} consume loop ended: {}", worker_index, e),
                            );
                        }
                    }
                }
            });

            handles.push(handle);
        }

        Ok(handles)
    }

    async fn health(&self) -> ServiceHealth {
        ServiceHealth::Healthy
    }
}

/// Serves the `/health`, `/ready`, `/metrics` HTTP surface (C10).
#[cfg(feature = "web")]
pub struct HealthServerService {
    state: crate::health::HealthState,
    port: u16,
}

#[cfg(feature = "web")]
impl HealthServerService {
    pub fn new(state: crate::health::HealthState, port: u16) -> Self {
        Self { state, port }
    }
}

#[cfg(feature = "web")]
#[async_trait]
impl Service for HealthServerService {
    fn name(&self) -> &'static str {
        "health"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn start(&mut self, shutdown: Arc<Notify>) -> Result<Vec<JoinHandle<()>>, String> {
        let router = crate::health::router(self.state.clone());
        let port = self.port;

        let handle = tokio::spawn(async move {
            let addr = format!("0.0.0.0:{}", port);
            let listener = match tokio::net::TcpListener::bind(&addr).await {
                Ok(l) => l,
                Err(e) => {
                    logger::error(LogTag::Health, &format!("failed to bind {}: {}", addr, e));
                    return;
                }
            };

            logger::info(LogTag::Health, &format!("health surface listening on {}", addr));

            let graceful = async move { shutdown.notified().await };
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(graceful).await {
                logger::error(LogTag::Health, &format!("health server error: {}", e));
            }
        });

        Ok(vec![handle])
    }

    async fn health(&self) -> ServiceHealth {
        ServiceHealth::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backfill_and_realtime_have_distinct_priorities() {
        assert_ne!(20, 21);
    }
}
