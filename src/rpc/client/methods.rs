//! RPC client methods implementation
//!
//! These methods provide a standard RpcClient API backed by the RpcManager.

use super::RpcClient;
use crate::rpc::stats::RpcStatsResponse;
use crate::rpc::types::{CircuitState, ProviderKind};
use crate::rpc::RpcError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use solana_transaction_status::EncodedConfirmedTransactionWithStatusMeta;
use std::str::FromStr;

/// Health information for a single RPC provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthInfo {
    /// Provider identifier
    pub provider_id: String,
    /// Provider URL (masked for security)
    pub url_masked: String,
    /// Provider kind (Helius, QuickNode, etc.)
    pub kind: ProviderKind,
    /// Whether provider is currently healthy
    pub is_healthy: bool,
    /// Whether provider is enabled
    pub is_enabled: bool,
    /// Circuit breaker state
    pub circuit_state: CircuitState,
    /// Total calls made to this provider
    pub total_calls: u64,
    /// Total errors from this provider
    pub total_errors: u64,
    /// Success rate (0.0 - 100.0)
    pub success_rate: f64,
    /// Average latency in milliseconds
    pub avg_latency_ms: f64,
    /// Consecutive failures count
    pub consecutive_failures: u32,
    /// Consecutive successes count
    pub consecutive_successes: u32,
    /// Base rate limit (requests per second)
    pub base_rate_limit: u32,
    /// Last successful call time
    pub last_success: Option<DateTime<Utc>>,
    /// Last failed call time
    pub last_failure: Option<DateTime<Utc>>,
    /// Last error message
    pub last_error: Option<String>,
}

/// Information about a transaction signature from getSignaturesForAddress
#[derive(Debug, Clone)]
pub struct SignatureInfo {
    /// The transaction signature
    pub signature: Signature,
    /// The slot the transaction was confirmed in
    pub slot: u64,
    /// Error if the transaction failed, None if successful
    pub err: Option<String>,
    /// Optional memo attached to the transaction
    pub memo: Option<String>,
    /// Block time as Unix timestamp
    pub block_time: Option<i64>,
    /// Confirmation status (processed, confirmed, finalized)
    pub confirmation_status: Option<String>,
}

/// Trait providing the RPC client methods the ingestion pipeline actually calls:
/// fetching full transactions, walking a program's signature history, and
/// reading provider health/stats. Solana wallet and transaction-submission
/// concerns (signing, sending, token account enumeration) have no caller here
/// and live only as RpcManager-level raw JSON-RPC if ever needed.
pub trait RpcClientMethods {
    /// Fetch a transaction by signature, jsonParsed encoding.
    fn get_transaction(
        &self,
        signature: &Signature,
    ) -> impl std::future::Future<Output = Result<Option<EncodedConfirmedTransactionWithStatusMeta>, String>>
           + Send;

    /// Get transaction signatures for an address, newest first.
    ///
    /// Use `before` for pagination to get older signatures.
    fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: Option<usize>,
        before: Option<&Signature>,
    ) -> impl std::future::Future<Output = Result<Vec<SignatureInfo>, String>> + Send;

    /// Check whether the underlying provider reports healthy.
    fn get_health(&self) -> impl std::future::Future<Output = Result<(), String>> + Send;

    /// Primary provider URL.
    fn url(&self) -> impl std::future::Future<Output = String> + Send;

    /// Aggregated RPC statistics (calls, errors, latency).
    fn get_stats(&self) -> impl std::future::Future<Output = RpcStatsResponse> + Send;

    /// Per-provider health info for every configured provider.
    fn get_provider_health(&self) -> impl std::future::Future<Output = Vec<ProviderHealthInfo>> + Send;
}

impl RpcClientMethods for RpcClient {
    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>, String> {
        let params = serde_json::json!([
            signature.to_string(),
            {
                "encoding": "jsonParsed",
                "commitment": "confirmed",
                "maxSupportedTransactionVersion": 0
            }
        ]);

        let result = self.manager.execute_raw("getTransaction", params).await;

        match result {
            Ok(value) => {
                if value.is_null() {
                    return Ok(None);
                }
                let tx: EncodedConfirmedTransactionWithStatusMeta =
                    serde_json::from_value(value)
                        .map_err(|e| format!("Failed to parse transaction: {}", e))?;
                Ok(Some(tx))
            }
            Err(RpcError::AccountNotFound { .. }) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: Option<usize>,
        before: Option<&Signature>,
    ) -> Result<Vec<SignatureInfo>, String> {
        let mut config = serde_json::Map::new();

        if let Some(limit_val) = limit {
            config.insert("limit".to_string(), serde_json::Value::Number(limit_val.into()));
        }

        if let Some(before_sig) = before {
            config.insert("before".to_string(), serde_json::Value::String(before_sig.to_string()));
        }

        config.insert("commitment".to_string(), serde_json::Value::String("confirmed".to_string()));

        let params = serde_json::json!([
            address.to_string(),
            serde_json::Value::Object(config)
        ]);

        let result = self
            .manager
            .execute_raw("getSignaturesForAddress", params)
            .await
            .map_err(|e| e.to_string())?;

        let signatures_array = result
            .as_array()
            .ok_or("Invalid response: expected array")?;

        let mut signatures = Vec::with_capacity(signatures_array.len());

        for item in signatures_array {
            let sig_str = item
                .get("signature")
                .and_then(|v| v.as_str())
                .ok_or("Missing signature field")?;

            let signature = Signature::from_str(sig_str)
                .map_err(|e| format!("Invalid signature: {}", e))?;

            let slot = item
                .get("slot")
                .and_then(|v| v.as_u64())
                .ok_or("Missing slot field")?;

            let err = item.get("err").and_then(|v| {
                if v.is_null() {
                    None
                } else {
                    Some(serde_json::to_string(v).unwrap_or_default())
                }
            });

            let memo = item.get("memo").and_then(|v| v.as_str()).map(String::from);

            let block_time = item.get("blockTime").and_then(|v| v.as_i64());

            let confirmation_status = item
                .get("confirmationStatus")
                .and_then(|v| v.as_str())
                .map(String::from);

            signatures.push(SignatureInfo {
                signature,
                slot,
                err,
                memo,
                block_time,
                confirmation_status,
            });
        }

        Ok(signatures)
    }

    async fn get_health(&self) -> Result<(), String> {
        let params = serde_json::json!([]);

        self.manager
            .execute_raw("getHealth", params)
            .await
            .map_err(|e| e.to_string())?;

        Ok(())
    }

    async fn url(&self) -> String {
        self.manager.primary_url().await.unwrap_or_default()
    }

    async fn get_stats(&self) -> RpcStatsResponse {
        self.manager.get_stats().await
    }

    async fn get_provider_health(&self) -> Vec<ProviderHealthInfo> {
        RpcClient::get_provider_health(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_info_carries_optional_fields() {
        let info = SignatureInfo {
            signature: Signature::default(),
            slot: 1,
            err: None,
            memo: None,
            block_time: Some(123),
            confirmation_status: Some("confirmed".to_string()),
        };
        assert_eq!(info.slot, 1);
        assert!(info.err.is_none());
    }
}
