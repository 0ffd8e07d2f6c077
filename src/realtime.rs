/// Realtime Indexer (C5).
///
/// Subscribes to program log notifications over the chain's websocket RPC
/// and enqueues an `IngestMessage` per notification, deduping against the
/// idempotency store's `seen:{signature}` markers and advancing the
/// per-program slot watermark. If the provider doesn't support
/// `logsSubscribe` the subscription fails once, cleanly, and the caller
/// degrades to backfill-only rather than crashing.
use crate::bus::TransactionBus;
use crate::errors::PipelineError;
use crate::logger::{self, LogTag};
use crate::model::{IngestMessage, Priority, Source};
use crate::rpc::websocket::{build_logs_subscribe_payload, get_websocket_url_from_http};
use crate::store::IdempotencyStore;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;

pub struct RealtimeIndexer {
    wss_url: String,
    program_id: String,
    bus: Arc<TransactionBus>,
    store: Arc<IdempotencyStore>,
    last_slot: AtomicI64,
}

impl RealtimeIndexer {
    pub fn new(rpc_http_url: &str, rpc_wss_url: Option<&str>, program_id: String, bus: Arc<TransactionBus>, store: Arc<IdempotencyStore>) -> Result<Self, PipelineError> {
        let wss_url = match rpc_wss_url {
            Some(url) => url.to_string(),
            None => get_websocket_url_from_http(rpc_http_url)?,
        };
        Ok(Self { wss_url, program_id, bus, store, last_slot: AtomicI64::new(-1) })
    }

    /// Runs until the connection closes or `shutdown` fires. Returns `Ok(())`
    /// both on a clean shutdown and on an "unsupported" subscription — the
    /// caller treats both the same way (stop realtime, keep the rest running).
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> Result<(), PipelineError> {
        let last = self.store.get_last_slot(&self.program_id).await?;
        if let Some(slot) = last {
            self.last_slot.store(slot as i64, Ordering::SeqCst);
        }

        let (ws_stream, _) = match tokio_tungstenite::connect_async(&self.wss_url).await {
            Ok(pair) => pair,
            Err(e) => {
                logger::warning(LogTag::Realtime, &format!("failed to connect to {}: {}", self.wss_url, e));
                return Ok(());
            }
        };

        let (mut write, mut read) = ws_stream.split();
        let payload = build_logs_subscribe_payload(&[self.program_id.as_str()]);
        if let Err(e) = write.send(Message::Text(payload.to_string())).await {
            logger::warning(LogTag::Realtime, &format!("failed to send logsSubscribe: {}", e));
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        logger::info(LogTag::Realtime, "shutdown signal received, closing subscription");
                        let _ = write.close().await;
                        return Ok(());
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if is_unsupported_method_error(&text) {
                                logger::warning(LogTag::Realtime, "provider does not support logsSubscribe, degrading to backfill-only");
                                return Ok(());
                            }
                            if let Some((signature, slot)) = parse_log_notification(&text) {
                                if let Err(e) = self.handle_notification(signature, slot).await {
                                    logger::warning(LogTag::Realtime, &format!("failed to handle notification: {}", e));
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            logger::warning(LogTag::Realtime, "websocket connection closed by peer");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            logger::warning(LogTag::Realtime, &format!("websocket error: {}", e));
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_notification(&self, signature: String, slot: u64) -> Result<(), PipelineError> {
        if self.store.is_indexed(&signature).await? {
            return Ok(());
        }

        let block_time = chrono::Utc::now().timestamp();

        let msg = IngestMessage {
            signature: signature.clone(),
            slot,
            block_time: Some(block_time),
            source: Source::Realtime,
            program_id: self.program_id.clone(),
            enqueued_at: chrono::Utc::now().timestamp(),
            attempt: 0,
            priority: Priority::Normal,
        };

        self.bus.publish(&msg).await?;
        self.store.mark_indexed(&signature).await?;

        let current = self.last_slot.load(Ordering::SeqCst);
        if slot as i64 > current {
            self.last_slot.store(slot as i64, Ordering::SeqCst);
            self.store.set_last_slot(&self.program_id, slot).await?;
        }

        Ok(())
    }
}

fn is_unsupported_method_error(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("logssubscribe") && (lowered.contains("method") || lowered.contains("not found"))
}

fn parse_log_notification(text: &str) -> Option<(String, u64)> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let params = value.get("params")?;
    let result = params.get("result")?;
    let context_slot = result.get("context")?.get("slot")?.as_u64()?;
    let signature = result.get("value")?.get("signature")?.as_str()?.to_string();
    Some((signature, context_slot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_unsupported_method_error() {
        let msg = r#"{"error":{"message":"Method not found: logsSubscribe"}}"#;
        assert!(is_unsupported_method_error(msg));
        assert!(!is_unsupported_method_error(r#"{"result":"ok"}"#));
    }

    #[test]
    fn parses_log_notification() {
        let text = r#"{
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": {"slot": 123},
                    "value": {"signature": "sig123", "err": null, "logs": []}
                },
                "subscription": 1
            }
        }"#;
        let (sig, slot) = parse_log_notification(text).unwrap();
        assert_eq!(sig, "sig123");
        assert_eq!(slot, 123);
    }
}
