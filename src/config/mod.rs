/// Pipeline configuration.
///
/// A single typed record populated once from environment variables at
/// startup (no TOML file, no hot-reload, no GUI metadata — the pipeline's
/// config surface is deliberately small and immutable once loaded). Every
/// component receives an `Arc<PipelineConfig>` rather than reaching into a
/// global.
use crate::errors::PipelineError;
use std::env;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chain RPC HTTP endpoint.
    pub rpc_http_url: String,
    /// Chain RPC websocket endpoint, used by the realtime indexer (C5).
    pub rpc_wss_url: Option<String>,
    /// Target on-chain program id this pipeline indexes.
    pub program_id: String,
    /// Stored-row target the Mode Coordinator (C6) compares against.
    pub target_transaction_count: u64,
    /// Number of signatures requested per backfill batch (C4).
    pub backfill_batch_size: usize,
    /// Number of concurrent enrichment worker loops (C7).
    pub worker_concurrency: u16,

    /// AMQP broker URL (C1).
    pub broker_url: String,
    pub broker_queue_name: String,
    pub broker_retry_delay: Duration,
    pub broker_max_retries: u32,
    pub broker_prefetch_count: u16,

    /// Idempotency / checkpoint store (C8), Redis-shaped.
    pub store_url: String,

    /// Analytics store (C9), ClickHouse-shaped.
    pub analytics_url: String,
    pub analytics_database: String,
    pub analytics_user: String,
    pub analytics_password: String,

    /// Price oracle (C2).
    pub oracle_endpoint: String,
    pub oracle_api_key: Option<String>,
    pub oracle_cache_ttl: Duration,
    pub oracle_min_request_interval: Duration,
    pub oracle_request_timeout: Duration,

    /// Health / admin surface (C10).
    pub health_port: u16,

    /// Minimum log level name (parsed by the logger module).
    pub log_level: String,
}

impl PipelineConfig {
    /// Load configuration from environment variables, applying defaults for
    /// everything that has a reasonable one and failing fast on anything
    /// that does not.
    pub fn from_env() -> Result<Self, PipelineError> {
        Ok(Self {
            rpc_http_url: require_env("PIPELINE_RPC_HTTP_URL")?,
            rpc_wss_url: optional_env("PIPELINE_RPC_WSS_URL"),
            program_id: require_env("PIPELINE_PROGRAM_ID")?,
            target_transaction_count: parse_env("PIPELINE_TARGET_TX_COUNT", 25_000)?,
            backfill_batch_size: parse_env("PIPELINE_BACKFILL_BATCH_SIZE", 1_000)?,
            worker_concurrency: parse_env("PIPELINE_WORKER_CONCURRENCY", 4)?,

            broker_url: env_or("PIPELINE_BROKER_URL", "amqp://127.0.0.1:5672/%2f"),
            broker_queue_name: env_or("PIPELINE_BROKER_QUEUE", "dln.transactions"),
            broker_retry_delay: Duration::from_millis(parse_env("PIPELINE_BROKER_RETRY_DELAY_MS", 5_000)?),
            broker_max_retries: parse_env("PIPELINE_BROKER_MAX_RETRIES", 5)?,
            broker_prefetch_count: parse_env("PIPELINE_BROKER_PREFETCH", 10)?,

            store_url: env_or("PIPELINE_STORE_URL", "redis://127.0.0.1:6379"),

            analytics_url: env_or("PIPELINE_ANALYTICS_URL", "http://127.0.0.1:8123"),
            analytics_database: env_or("PIPELINE_ANALYTICS_DATABASE", "default"),
            analytics_user: env_or("PIPELINE_ANALYTICS_USER", "default"),
            analytics_password: env_or("PIPELINE_ANALYTICS_PASSWORD", ""),

            oracle_endpoint: require_env("PIPELINE_ORACLE_ENDPOINT")?,
            oracle_api_key: optional_env("PIPELINE_ORACLE_API_KEY"),
            oracle_cache_ttl: Duration::from_secs(parse_env("PIPELINE_ORACLE_CACHE_TTL_SECS", 300)?),
            oracle_min_request_interval: Duration::from_millis(parse_env(
                "PIPELINE_ORACLE_MIN_INTERVAL_MS",
                1_000,
            )?),
            oracle_request_timeout: Duration::from_secs(parse_env("PIPELINE_ORACLE_TIMEOUT_SECS", 30)?),

            health_port: parse_env("PIPELINE_HEALTH_PORT", 8080)?,
            log_level: env_or("PIPELINE_LOG_LEVEL", "info"),
        })
    }
}

fn require_env(name: &str) -> Result<String, PipelineError> {
    env::var(name).map_err(|_| {
        PipelineError::configuration(format!("missing required environment variable {}", name))
    })
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, PipelineError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| PipelineError::configuration(format!("invalid value for {}: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

/// Load configuration once and wrap it for cheap sharing across services.
pub fn load_config() -> Result<Arc<PipelineConfig>, PipelineError> {
    Ok(Arc::new(PipelineConfig::from_env()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        for (k, v) in vars {
            env::set_var(k, v);
        }
        f();
        for (k, _) in vars {
            env::remove_var(k);
        }
    }

    #[test]
    fn from_env_fails_without_required_vars() {
        env::remove_var("PIPELINE_RPC_HTTP_URL");
        env::remove_var("PIPELINE_PROGRAM_ID");
        env::remove_var("PIPELINE_ORACLE_ENDPOINT");
        assert!(PipelineConfig::from_env().is_err());
    }

    #[test]
    fn from_env_applies_defaults() {
        with_env(
            &[
                ("PIPELINE_RPC_HTTP_URL", "https://rpc.example.com"),
                ("PIPELINE_PROGRAM_ID", "Prog1111111111111111111111111111111111111"),
                ("PIPELINE_ORACLE_ENDPOINT", "https://prices.example.com"),
            ],
            || {
                let cfg = PipelineConfig::from_env().expect("config should load");
                assert_eq!(cfg.target_transaction_count, 25_000);
                assert_eq!(cfg.broker_queue_name, "dln.transactions");
                assert_eq!(cfg.health_port, 8080);
            },
        );
    }
}
