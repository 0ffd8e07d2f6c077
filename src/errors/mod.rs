/// Structured error taxonomy for the ingestion pipeline.
///
/// Mirrors the error-kind table in the design doc: each family below carries
/// enough context to drive the ack / nack / retry decision without
/// string-matching an upstream message at the call site.

#[derive(Debug, Clone)]
pub enum PipelineError {
    Network(NetworkError),
    Rpc(RpcProviderError),
    Bus(BusError),
    Oracle(OracleError),
    Parser(ParserError),
    Store(StoreError),
    Analytics(AnalyticsError),
    Configuration(ConfigurationError),
    Validation(ValidationError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Network(e) => write!(f, "Network error: {}", e),
            PipelineError::Rpc(e) => write!(f, "RPC error: {}", e),
            PipelineError::Bus(e) => write!(f, "Bus error: {}", e),
            PipelineError::Oracle(e) => write!(f, "Oracle error: {}", e),
            PipelineError::Parser(e) => write!(f, "Parser error: {}", e),
            PipelineError::Store(e) => write!(f, "Store error: {}", e),
            PipelineError::Analytics(e) => write!(f, "Analytics error: {}", e),
            PipelineError::Configuration(e) => write!(f, "Configuration error: {}", e),
            PipelineError::Validation(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
    /// Whether a worker/bus consumer should retry (nack) rather than permanently
    /// ack the message. Matches the error-kind policy table: validation failures,
    /// "not found" and parser-produced-no-event outcomes are permanent; timeouts,
    /// connection resets, 429/5xx, and anything unclassified are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Validation(_) => false,
            PipelineError::Network(e) => e.is_retryable(),
            PipelineError::Rpc(e) => e.is_retryable(),
            PipelineError::Bus(_) => true,
            PipelineError::Oracle(_) => false, // oracle failures degrade to zero price, never block acking
            PipelineError::Parser(_) => false, // "no event" is not an error at all; see worker
            PipelineError::Store(_) => true,
            PipelineError::Analytics(_) => true,
            PipelineError::Configuration(_) => false,
        }
    }
}

// =============================================================================
// NETWORK
// =============================================================================

#[derive(Debug, Clone)]
pub enum NetworkError {
    ConnectionTimeout { endpoint: String, timeout_ms: u64 },
    ConnectionRefused { endpoint: String },
    HttpStatusError { endpoint: String, status: u16, body: Option<String> },
    DnsResolutionFailed { hostname: String },
    Generic { message: String },
}

impl NetworkError {
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::HttpStatusError { status, .. } => *status == 429 || *status >= 500,
            NetworkError::Generic { message } => {
                let m = message.to_lowercase();
                m.contains("timeout")
                    || m.contains("econnreset")
                    || m.contains("econnrefused")
                    || m.contains("connection reset")
            }
            _ => true,
        }
    }
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::ConnectionTimeout { endpoint, timeout_ms } => {
                write!(f, "connection timeout to {} after {}ms", endpoint, timeout_ms)
            }
            NetworkError::ConnectionRefused { endpoint } => {
                write!(f, "connection refused by {}", endpoint)
            }
            NetworkError::HttpStatusError { endpoint, status, body } => write!(
                f,
                "HTTP {} from {}: {}",
                status,
                endpoint,
                body.as_deref().unwrap_or("no body")
            ),
            NetworkError::DnsResolutionFailed { hostname } => {
                write!(f, "DNS resolution failed for {}", hostname)
            }
            NetworkError::Generic { message } => write!(f, "{}", message),
        }
    }
}

// =============================================================================
// RPC PROVIDER
// =============================================================================

#[derive(Debug, Clone)]
pub enum RpcProviderError {
    NotFound { signature: String },
    RateLimited { provider: String, retry_after_ms: Option<u64> },
    Timeout { provider: String, after_ms: u64 },
    InvalidResponse { provider: String, message: String },
    Generic { provider: String, message: String },
}

impl RpcProviderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RpcProviderError::NotFound { .. })
    }
}

impl std::fmt::Display for RpcProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcProviderError::NotFound { signature } => {
                write!(f, "transaction not found: {}", signature)
            }
            RpcProviderError::RateLimited { provider, .. } => {
                write!(f, "rate limited by {}", provider)
            }
            RpcProviderError::Timeout { provider, after_ms } => {
                write!(f, "{} timed out after {}ms", provider, after_ms)
            }
            RpcProviderError::InvalidResponse { provider, message } => {
                write!(f, "invalid response from {}: {}", provider, message)
            }
            RpcProviderError::Generic { provider, message } => {
                write!(f, "{} error: {}", provider, message)
            }
        }
    }
}

// =============================================================================
// BUS (C1)
// =============================================================================

#[derive(Debug, Clone)]
pub enum BusError {
    PublishFailed { reason: String },
    ConfirmTimeout,
    ConsumeFailed { reason: String },
    Generic { message: String },
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::PublishFailed { reason } => write!(f, "publish failed: {}", reason),
            BusError::ConfirmTimeout => write!(f, "publisher confirm timed out"),
            BusError::ConsumeFailed { reason } => write!(f, "consume failed: {}", reason),
            BusError::Generic { message } => write!(f, "{}", message),
        }
    }
}

// =============================================================================
// ORACLE (C2)
// =============================================================================

#[derive(Debug, Clone)]
pub enum OracleError {
    RequestFailed { status: Option<u16>, message: String },
    RetriesExhausted { attempts: u32 },
    Generic { message: String },
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::RequestFailed { status, message } => {
                write!(f, "oracle request failed ({:?}): {}", status, message)
            }
            OracleError::RetriesExhausted { attempts } => {
                write!(f, "oracle retries exhausted after {} attempts", attempts)
            }
            OracleError::Generic { message } => write!(f, "{}", message),
        }
    }
}

// =============================================================================
// PARSER (C3)
// =============================================================================

#[derive(Debug, Clone)]
pub enum ParserError {
    NoOrderId,
    NoEventType,
    Generic { message: String },
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParserError::NoOrderId => write!(f, "no orderId could be extracted from logs"),
            ParserError::NoEventType => write!(f, "no recognized instruction/event type"),
            ParserError::Generic { message } => write!(f, "{}", message),
        }
    }
}

// =============================================================================
// STORE (C8)
// =============================================================================

#[derive(Debug, Clone)]
pub enum StoreError {
    ConnectionFailed { message: String },
    CommandFailed { command: String, message: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ConnectionFailed { message } => {
                write!(f, "idempotency store connection failed: {}", message)
            }
            StoreError::CommandFailed { command, message } => {
                write!(f, "idempotency store command {} failed: {}", command, message)
            }
        }
    }
}

// =============================================================================
// ANALYTICS (C9)
// =============================================================================

#[derive(Debug, Clone)]
pub enum AnalyticsError {
    InsertFailed { message: String },
    QueryFailed { message: String },
}

impl std::fmt::Display for AnalyticsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalyticsError::InsertFailed { message } => write!(f, "insert failed: {}", message),
            AnalyticsError::QueryFailed { message } => write!(f, "query failed: {}", message),
        }
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[derive(Debug, Clone)]
pub enum ConfigurationError {
    MissingEnvVar { name: String },
    InvalidValue { name: String, reason: String },
    Generic { message: String },
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::MissingEnvVar { name } => {
                write!(f, "missing required environment variable {}", name)
            }
            ConfigurationError::InvalidValue { name, reason } => {
                write!(f, "invalid value for {}: {}", name, reason)
            }
            ConfigurationError::Generic { message } => write!(f, "{}", message),
        }
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

#[derive(Debug, Clone)]
pub enum ValidationError {
    BadMessageShape { reason: String },
    Generic { message: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::BadMessageShape { reason } => {
                write!(f, "bad ingest message shape: {}", reason)
            }
            ValidationError::Generic { message } => write!(f, "{}", message),
        }
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

impl From<String> for PipelineError {
    fn from(err: String) -> Self {
        PipelineError::Network(NetworkError::Generic { message: err })
    }
}

impl From<&str> for PipelineError {
    fn from(err: &str) -> Self {
        PipelineError::Network(NetworkError::Generic { message: err.to_string() })
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Network(NetworkError::Generic { message: format!("timeout: {}", err) })
        } else if let Some(status) = err.status() {
            PipelineError::Network(NetworkError::HttpStatusError {
                endpoint: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
                body: None,
            })
        } else {
            PipelineError::Network(NetworkError::Generic { message: err.to_string() })
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Validation(ValidationError::Generic {
            message: format!("JSON error: {}", err),
        })
    }
}

impl From<lapin::Error> for PipelineError {
    fn from(err: lapin::Error) -> Self {
        PipelineError::Bus(BusError::Generic { message: err.to_string() })
    }
}

impl From<redis::RedisError> for PipelineError {
    fn from(err: redis::RedisError) -> Self {
        PipelineError::Store(StoreError::CommandFailed {
            command: "unknown".to_string(),
            message: err.to_string(),
        })
    }
}

impl From<clickhouse::error::Error> for PipelineError {
    fn from(err: clickhouse::error::Error) -> Self {
        PipelineError::Analytics(AnalyticsError::InsertFailed { message: err.to_string() })
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl PipelineError {
    pub fn network(message: impl Into<String>) -> Self {
        PipelineError::Network(NetworkError::Generic { message: message.into() })
    }

    pub fn rpc_not_found(signature: impl Into<String>) -> Self {
        PipelineError::Rpc(RpcProviderError::NotFound { signature: signature.into() })
    }

    pub fn bus(message: impl Into<String>) -> Self {
        PipelineError::Bus(BusError::Generic { message: message.into() })
    }

    pub fn oracle(message: impl Into<String>) -> Self {
        PipelineError::Oracle(OracleError::Generic { message: message.into() })
    }

    pub fn store(message: impl Into<String>) -> Self {
        PipelineError::Store(StoreError::ConnectionFailed { message: message.into() })
    }

    pub fn analytics(message: impl Into<String>) -> Self {
        PipelineError::Analytics(AnalyticsError::InsertFailed { message: message.into() })
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        PipelineError::Configuration(ConfigurationError::Generic { message: message.into() })
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation(ValidationError::BadMessageShape { reason: message.into() })
    }
}
