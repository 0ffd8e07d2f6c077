//! RPC Module - Centralized RPC client management
//!
//! This module provides:
//! - Multi-provider support with automatic failover
//! - Per-provider rate limiting with Governor (GCRA)
//! - Circuit breaker pattern for reliability
//! - SQLite-based statistics
//! - Connection pooling
//!
//! # Architecture
//!
//! ```text
//! RpcManager (orchestrator)
//!   ├── ProviderConfigs (static configuration)
//!   ├── ProviderStates (runtime health/stats)
//!   ├── RateLimiterManager (per-provider rate limits)
//!   ├── CircuitBreakerManager (failover logic)
//!   ├── StatsManager (SQLite-backed statistics)
//!   └── Selectors (routing strategies)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::rpc::{init_rpc_manager, client::RpcClient, RpcClientMethods};
//!
//! let manager = init_rpc_manager("https://api.mainnet-beta.solana.com").await?;
//! let client = RpcClient::new(manager);
//! let tx = client.get_transaction(&signature).await?;
//! ```

pub mod circuit_breaker;
pub mod client;
pub mod errors;
pub mod manager;
pub mod provider;
pub mod rate_limiter;
pub mod selector;
pub mod stats;
pub mod testing;
pub mod types;
pub mod websocket;

// ============================================================================
// Re-exports - Circuit Breaker
// ============================================================================

pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerStatus, ProviderCircuitBreaker,
};

// ============================================================================
// Re-exports - Client
// ============================================================================

pub use client::{ProviderHealthInfo, RpcClientMethods, SignatureInfo};

// ============================================================================
// Re-exports - Errors
// ============================================================================

pub use errors::RpcError;

// ============================================================================
// Re-exports - Manager (main orchestrator)
// ============================================================================

pub use manager::{get_or_init_rpc_manager, get_rpc_manager, init_rpc_manager, RpcManager};

// ============================================================================
// Re-exports - Provider
// ============================================================================

pub use provider::{
    config::ProviderConfig, derive_websocket_url, detect_provider_kind, generate_provider_id,
    ProviderRef, RpcProvider,
};

// ============================================================================
// Re-exports - Rate Limiter
// ============================================================================

pub use rate_limiter::{
    ExponentialBackoff, ProviderRateLimiter, RateLimiterManager, RateLimiterStatus,
    SlidingWindowTracker,
};

// ============================================================================
// Re-exports - Selector
// ============================================================================

pub use selector::{create_selector, ProviderSelector};

// ============================================================================
// Re-exports - Stats
// ============================================================================

pub use stats::{
    get_rpc_stats_db_path, MethodStats, ProviderStats, RpcCallRecord, RpcStatsDatabase,
    RpcStatsResponse, SessionStats, StatsCollector, StatsManager, StatsMessage, StatsSnapshot,
    TimeBucketStats,
};

// ============================================================================
// Re-exports - Types
// ============================================================================

pub use types::{
    mask_url, CircuitState, ProviderKind, ProviderState, RpcCallResult, RpcMethod,
    SelectionStrategy,
};

// ============================================================================
// Re-exports - WebSocket Utilities
// ============================================================================

pub use websocket::{build_logs_subscribe_payload, get_websocket_url_from_http};

// ============================================================================
// Re-exports - Testing Utilities
// ============================================================================

pub use testing::{
    get_rpc_version, test_rpc_endpoint, test_rpc_endpoints, validate_mainnet,
    RpcEndpointTestResult,
};

// ============================================================================
// Convenience Functions
// ============================================================================

/// Get primary RPC URL (masked for security) for the global manager, if one
/// has been initialized.
pub async fn get_rpc_url() -> String {
    match get_rpc_manager() {
        Some(manager) => client::RpcClient::new(manager).primary_url_masked().await,
        None => String::from("(not initialized)"),
    }
}

/// Test if the global RPC manager is healthy.
pub async fn is_rpc_healthy() -> bool {
    use client::RpcClientMethods;
    match get_rpc_manager() {
        Some(manager) => client::RpcClient::new(manager).get_health().await.is_ok(),
        None => false,
    }
}

/// Get aggregated RPC statistics for the global manager, if initialized.
pub async fn get_rpc_stats() -> Option<stats::RpcStatsResponse> {
    match get_rpc_manager() {
        Some(manager) => Some(manager.get_stats().await),
        None => None,
    }
}

/// Get health info for all configured RPC providers.
pub async fn get_all_provider_health() -> Vec<client::ProviderHealthInfo> {
    match get_rpc_manager() {
        Some(manager) => client::RpcClient::new(manager).get_provider_health().await,
        None => Vec::new(),
    }
}
