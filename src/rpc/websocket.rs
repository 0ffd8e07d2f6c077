//! WebSocket utilities for the realtime indexer's log subscription.

use crate::errors::PipelineError;
use crate::rpc::provider::derive_websocket_url;

/// Convert an HTTP/HTTPS RPC URL to its WebSocket equivalent.
///
/// # Examples
/// - `https://api.mainnet-beta.solana.com` -> `wss://api.mainnet-beta.solana.com`
/// - `http://localhost:8899` -> `ws://localhost:8899`
pub fn get_websocket_url_from_http(http_url: &str) -> Result<String, PipelineError> {
    derive_websocket_url(http_url)
        .ok_or_else(|| PipelineError::configuration(format!("cannot derive websocket url from {}", http_url)))
}

/// Builds the `logsSubscribe` JSON-RPC payload for the configured program id,
/// at confirmed commitment.
pub fn build_logs_subscribe_payload(mentions: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "logsSubscribe",
        "params": [
            { "mentions": mentions },
            { "commitment": "confirmed" }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_logs_subscribe_payload_with_mentions() {
        let payload = build_logs_subscribe_payload(&["Prog1111111111111111111111111111111111111"]);
        assert_eq!(payload["method"], "logsSubscribe");
        assert_eq!(payload["params"][0]["mentions"][0], "Prog1111111111111111111111111111111111111");
    }
}
