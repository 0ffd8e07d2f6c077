// Pipeline bootstrap and lifecycle, orchestrated through ServiceManager.

use crate::analytics::AnalyticsStore;
use crate::arguments::{is_backfill_only_enabled, is_realtime_only_enabled};
use crate::bus::TransactionBus;
use crate::config::PipelineConfig;
use crate::coordinator::{CoordinatorState, ModeCoordinator};
use crate::logger::{self, LogTag};
use crate::oracle::PriceOracleClient;
use crate::rpc::client::RpcClient;
use crate::rpc::manager::init_rpc_manager;
use crate::services::implementations::{BackfillService, IndexerService, RealtimeService, WorkerService};
use crate::services::ServiceManager;
use crate::store::IdempotencyStore;
use std::sync::Arc;

/// Runs the ingestion pipeline end to end: acquires the process lock, loads
/// configuration, connects every backing store, decides backfill vs.
/// realtime mode, registers the corresponding services, and blocks until a
/// shutdown signal arrives.
pub async fn run_pipeline() -> Result<(), String> {
    let _process_lock = crate::process_lock::ProcessLock::acquire()?;

    logger::info(LogTag::System, "dln-indexer starting up");

    let config = crate::config::load_config().map_err(|e| e.to_string())?;

    logger::info(LogTag::System, "configuration loaded successfully");

    let rpc_manager = init_rpc_manager(&config.rpc_http_url)
        .await
        .map_err(|e| format!("failed to initialize rpc manager: {}", e))?;
    let rpc = Arc::new(RpcClient::new(rpc_manager));

    let bus = Arc::new(
        TransactionBus::connect(
            &config.broker_url,
            &config.broker_queue_name,
            config.broker_prefetch_count,
            config.broker_retry_delay,
        )
        .await
        .map_err(|e| format!("failed to connect to message bus: {}", e))?,
    );

    let store = Arc::new(
        IdempotencyStore::connect(&config.store_url)
            .await
            .map_err(|e| format!("failed to connect to idempotency store: {}", e))?,
    );

    let analytics = Arc::new(AnalyticsStore::new(
        &config.analytics_url,
        &config.analytics_database,
        &config.analytics_user,
        &config.analytics_password,
    ));

    let oracle = Arc::new(PriceOracleClient::new(
        config.oracle_endpoint.clone(),
        config.oracle_api_key.clone(),
        store.clone(),
        config.oracle_cache_ttl,
        config.oracle_min_request_interval,
        config.oracle_request_timeout,
    ));

    logger::info(LogTag::System, "backing stores connected (bus, idempotency store, analytics, oracle)");

    let mut service_manager = ServiceManager::new((*config).clone())
        .await
        .map_err(|e| format!("failed to initialize service manager: {}", e))?;

    register_worker(&mut service_manager, &config, &rpc, &analytics, &store, &oracle, &bus);

    #[cfg(feature = "web")]
    register_health_server(&mut service_manager, &config);

    register_indexers(&mut service_manager, &config, &rpc, &bus, &store, &analytics).await?;

    service_manager.start_all().await?;

    logger::info(LogTag::System, "all services started, dln-indexer is running");

    wait_for_shutdown_signal().await?;

    logger::info(LogTag::System, "initiating graceful shutdown");
    service_manager.stop_all().await?;

    logger::info(LogTag::System, "dln-indexer shut down successfully");

    Ok(())
}

fn register_worker(
    manager: &mut ServiceManager,
    config: &Arc<PipelineConfig>,
    rpc: &Arc<RpcClient>,
    analytics: &Arc<AnalyticsStore>,
    store: &Arc<IdempotencyStore>,
    oracle: &Arc<PriceOracleClient>,
    bus: &Arc<TransactionBus>,
) {
    manager.register(Box::new(WorkerService::new(
        rpc.clone(),
        analytics.clone(),
        store.clone(),
        oracle.clone(),
        bus.clone(),
        config.worker_concurrency,
        config.broker_max_retries,
    )));
}

#[cfg(feature = "web")]
fn register_health_server(manager: &mut ServiceManager, config: &Arc<PipelineConfig>) {
    use crate::health::HealthState;
    use crate::services::implementations::HealthServerService;
    use std::sync::RwLock;

    let state = HealthState {
        mode: Arc::new(RwLock::new("initializing".to_string())),
        program_id: config.program_id.clone(),
        batch_size: config.backfill_batch_size,
        concurrency: config.worker_concurrency,
        retry_attempts: config.broker_max_retries,
        target_transactions: config.target_transaction_count,
    };

    manager.register(Box::new(HealthServerService::new(state, config.health_port)));
}

/// Decides backfill vs. realtime mode (honoring the `--backfill-only` /
/// `--realtime-only` overrides) and registers whichever indexer services
/// apply.
///
/// `--backfill-only` and `--realtime-only` each run a single indexer for the
/// whole process lifetime, as their names imply. Left to the coordinator,
/// backfill is never the final word: once it completes, the pipeline
/// unconditionally moves on to realtime (C6), so that case registers
/// `IndexerService` rather than `BackfillService` to drive the handoff.
async fn register_indexers(
    manager: &mut ServiceManager,
    config: &Arc<PipelineConfig>,
    rpc: &Arc<RpcClient>,
    bus: &Arc<TransactionBus>,
    store: &Arc<IdempotencyStore>,
    analytics: &Arc<AnalyticsStore>,
) -> Result<(), String> {
    if is_backfill_only_enabled() {
        manager.register(Box::new(BackfillService::new(
            rpc.clone(),
            bus.clone(),
            store.clone(),
            config.program_id.clone(),
            config.backfill_batch_size,
            config.target_transaction_count,
        )));
        return Ok(());
    }

    if is_realtime_only_enabled() {
        manager.register(Box::new(RealtimeService::new(
            config.rpc_http_url.clone(),
            config.rpc_wss_url.clone(),
            config.program_id.clone(),
            bus.clone(),
            store.clone(),
        )));
        return Ok(());
    }

    let coordinator = ModeCoordinator::new(
        store.clone(),
        analytics.clone(),
        config.program_id.clone(),
        config.target_transaction_count,
    );

    match coordinator.decide().await {
        CoordinatorState::Backfill => {
            manager.register(Box::new(IndexerService::new(
                rpc.clone(),
                bus.clone(),
                store.clone(),
                config.program_id.clone(),
                config.backfill_batch_size,
                config.target_transaction_count,
                config.rpc_http_url.clone(),
                config.rpc_wss_url.clone(),
            )));
        }
        CoordinatorState::Realtime => {
            manager.register(Box::new(RealtimeService::new(
                config.rpc_http_url.clone(),
                config.rpc_wss_url.clone(),
                config.program_id.clone(),
                bus.clone(),
                store.clone(),
            )));
        }
        other => {
            return Err(format!("mode coordinator returned unexpected state: {:?}", other));
        }
    }

    Ok(())
}

/// Waits for Ctrl+C, then arms a second listener so a repeated Ctrl+C forces
/// an immediate exit during a slow graceful shutdown.
async fn wait_for_shutdown_signal() -> Result<(), String> {
    logger::info(LogTag::System, "waiting for Ctrl+C (press twice to force kill)");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for shutdown signal: {}", e))?;

    logger::warning(LogTag::System, "shutdown signal received, press Ctrl+C again to force kill");

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            logger::error(LogTag::System, "second Ctrl+C detected, forcing immediate exit");
            std::process::exit(130);
        }
    });

    Ok(())
}
