/// Backfill Indexer (C4).
///
/// Walks a program's signature history backwards from the newest signature,
/// page by page, publishing an `IngestMessage` per signature found. Stops
/// once the idempotency store's processed counter reaches the configured
/// target, a page comes back empty, or an explicit `until_signature` cursor
/// is reached.
use crate::bus::TransactionBus;
use crate::errors::PipelineError;
use crate::logger::{self, LogTag};
use crate::model::{IngestMessage, Priority, Source};
use crate::rpc::client::RpcClientMethods;
use crate::store::IdempotencyStore;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

const QUIESCENT_SLEEP: Duration = Duration::from_millis(100);
const ERROR_SLEEP: Duration = Duration::from_secs(5);

pub struct BackfillReport {
    pub batches: u64,
    pub signatures_seen: u64,
    pub signatures_published: u64,
    pub wall_time: Duration,
}

impl BackfillReport {
    pub fn throughput_per_sec(&self) -> f64 {
        let secs = self.wall_time.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.signatures_published as f64 / secs
    }
}

pub struct BackfillIndexer<C: RpcClientMethods> {
    rpc: Arc<C>,
    bus: Arc<TransactionBus>,
    store: Arc<IdempotencyStore>,
    program_id: String,
    batch_size: usize,
    target_transaction_count: u64,
}

impl<C: RpcClientMethods> BackfillIndexer<C> {
    pub fn new(
        rpc: Arc<C>,
        bus: Arc<TransactionBus>,
        store: Arc<IdempotencyStore>,
        program_id: String,
        batch_size: usize,
        target_transaction_count: u64,
    ) -> Self {
        Self { rpc, bus, store, program_id, batch_size, target_transaction_count }
    }

    /// Runs the backfill loop until a termination condition is hit.
    /// `until_signature`, if given, stops the walk once that signature is
    /// observed in a returned page (inclusive).
    pub async fn run(&self, until_signature: Option<&str>) -> Result<BackfillReport, PipelineError> {
        let program_pubkey = Pubkey::from_str(&self.program_id)
            .map_err(|e| PipelineError::configuration(format!("invalid program id {}: {}", self.program_id, e)))?;

        let started = Instant::now();
        let mut batches = 0u64;
        let mut signatures_seen = 0u64;
        let mut signatures_published = 0u64;
        let mut cursor: Option<Signature> = None;

        loop {
            let processed = self.store.get_processed_count(&self.program_id).await.unwrap_or(0);
            if processed as u64 >= self.target_transaction_count {
                logger::info(LogTag::Backfill, &format!("target of {} transactions reached, stopping", self.target_transaction_count));
                break;
            }

            let page = match self.rpc.get_signatures_for_address(&program_pubkey, Some(self.batch_size), cursor.as_ref()).await {
                Ok(page) => page,
                Err(e) => {
                    logger::warning(LogTag::Backfill, &format!("get_signatures_for_address failed, retrying same cursor: {}", e));
                    sleep(ERROR_SLEEP).await;
                    continue;
                }
            };

            batches += 1;

            if page.is_empty() {
                logger::info(LogTag::Backfill, "reached the end of signature history, stopping");
                break;
            }

            let mut hit_until = false;

            for info in &page {
                signatures_seen += 1;
                let signature_str = info.signature.to_string();

                if let Some(until) = until_signature {
                    if signature_str == until {
                        hit_until = true;
                    }
                }

                if self.store.is_indexed(&signature_str).await.unwrap_or(false) {
                    continue;
                }

                let msg = IngestMessage {
                    signature: signature_str.clone(),
                    slot: info.slot,
                    block_time: info.block_time,
                    source: Source::History,
                    program_id: self.program_id.clone(),
                    enqueued_at: chrono::Utc::now().timestamp(),
                    attempt: 0,
                    priority: Priority::Low,
                };

                match self.bus.publish(&msg).await {
                    Ok(true) => {
                        signatures_published += 1;
                        if let Err(e) = self.store.mark_indexed(&signature_str).await {
                            logger::warning(LogTag::Backfill, &format!("failed to mark {} indexed: {}", signature_str, e));
                        }
                    }
                    Ok(false) => {
                        logger::warning(LogTag::Backfill, &format!("failed to publish {} after retries, will re-attempt next pass", signature_str));
                    }
                    Err(e) => {
                        logger::warning(LogTag::Backfill, &format!("publish error for {}: {}", signature_str, e));
                    }
                }

                if hit_until {
                    break;
                }
            }

            cursor = page.last().map(|info| info.signature);

            if hit_until {
                logger::info(LogTag::Backfill, "reached the configured until-signature cursor, stopping");
                break;
            }

            sleep(QUIESCENT_SLEEP).await;
        }

        Ok(BackfillReport {
            batches,
            signatures_seen,
            signatures_published,
            wall_time: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_is_zero_for_instant_runs() {
        let report = BackfillReport { batches: 0, signatures_seen: 0, signatures_published: 0, wall_time: Duration::from_secs(0) };
        assert_eq!(report.throughput_per_sec(), 0.0);
    }

    #[test]
    fn throughput_divides_published_by_elapsed_seconds() {
        let report = BackfillReport { batches: 1, signatures_seen: 100, signatures_published: 100, wall_time: Duration::from_secs(10) };
        assert_eq!(report.throughput_per_sec(), 10.0);
    }
}
