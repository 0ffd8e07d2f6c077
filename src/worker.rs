/// Enrichment Worker (C7).
///
/// Consumes an `IngestMessage`, fetches the full transaction, classifies it
/// with the Event Parser, enriches every token movement with a USD price,
/// and writes the resulting rows to the analytics store. Returning `Ok(true)`
/// from `handle` acks the message; `Ok(false)` or `Err` sends it down the
/// bus's retry path, except for the explicitly permanent failures below,
/// which are acked immediately since retrying them can never succeed.
use crate::analytics::AnalyticsStore;
use crate::errors::PipelineError;
use crate::logger::{self, LogTag};
use crate::model::{AnalyticsRow, Direction, EventType, IngestMessage, InstructionType, TokenTransfer, TxStatus};
use crate::oracle::PriceOracleClient;
use crate::parser::parse_event;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::rpc::client::RpcClientMethods;
use crate::store::IdempotencyStore;
use solana_sdk::signature::Signature;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{EncodedConfirmedTransactionWithStatusMeta, UiTransactionStatusMeta, UiTransactionTokenBalance};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const MAX_LOG_SAMPLES: usize = 20;
const NATIVE_SOL_MINT: &str = "So11111111111111111111111111111111111111112";
const DEFAULT_DECIMALS: u8 = 9;

pub struct EnrichmentWorker<C: RpcClientMethods> {
    rpc: Arc<C>,
    analytics: Arc<AnalyticsStore>,
    store: Arc<IdempotencyStore>,
    oracle: Arc<PriceOracleClient>,
}

impl<C: RpcClientMethods> EnrichmentWorker<C> {
    pub fn new(rpc: Arc<C>, analytics: Arc<AnalyticsStore>, store: Arc<IdempotencyStore>, oracle: Arc<PriceOracleClient>) -> Self {
        Self { rpc, analytics, store, oracle }
    }

    pub async fn handle(&self, msg: IngestMessage) -> Result<bool, PipelineError> {
        if let Err(e) = msg.validate() {
            logger::warning(LogTag::Worker, &format!("dropping invalid message: {}", e));
            return Ok(true);
        }

        let fetched = match self.fetch_transaction(&msg.signature).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                logger::warning(LogTag::Worker, &format!("transaction {} not found after retries, dropping", msg.signature));
                return Ok(true);
            }
            Err(e) => {
                if is_permanent_fetch_error(&e) {
                    logger::warning(LogTag::Worker, &format!("permanent fetch error for {}: {}", msg.signature, e));
                    return Ok(true);
                }
                return Err(e);
            }
        };

        let event = match parse_event(&fetched, &msg.signature) {
            Some(event) => event,
            None => {
                let samples = sample_logs(&fetched, MAX_LOG_SAMPLES);
                logger::info(
                    LogTag::Worker,
                    &format!("no recognizable event in {} ({} sample log lines: {:?})", msg.signature, samples.len(), samples),
                );
                return Ok(true);
            }
        };

        let meta = fetched.transaction.meta.as_ref();
        let status = meta.map(derive_status).unwrap_or(TxStatus::Pending);
        let now = chrono::Utc::now().timestamp();

        let mut transfers = Vec::new();
        if let Some(meta) = meta {
            transfers.extend(native_transfers(meta, &fetched));
            transfers.extend(spl_transfers(meta));
        }

        let rows = if transfers.is_empty() {
            vec![AnalyticsRow::placeholder(
                &msg.signature,
                msg.slot,
                msg.block_time.unwrap_or(event.block_time),
                &msg.program_id,
                status,
                event.event_type.as_str(),
                &event.order_id,
                now,
            )]
        } else {
            let mints: HashSet<String> = transfers.iter().map(|(t, _)| t.mint.clone()).collect();
            let mint_list: Vec<String> = mints.into_iter().collect();
            let prices = self.oracle.get_prices(&mint_list).await;

            transfers
                .into_iter()
                .map(|(transfer, decimals)| build_row(&msg, &event, &transfer, decimals, status, &prices, now))
                .collect()
        };

        let row_count = rows.len();
        if let Err(e) = self.analytics.insert(&rows).await {
            logger::warning(LogTag::Worker, &format!("analytics insert failed for {}: {}", msg.signature, e));
            return Err(e);
        }

        if let Err(e) = self.store.incr_processed_count(&msg.program_id, row_count as i64).await {
            logger::warning(LogTag::Worker, &format!("failed to increment processed count: {}", e));
        }

        Ok(true)
    }

    async fn fetch_transaction(&self, signature: &str) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>, PipelineError> {
        let parsed_signature = Signature::from_str(signature)
            .map_err(|e| PipelineError::validation(format!("invalid signature {}: {}", signature, e)))?;

        let policy = RetryPolicy::linear(3, Duration::from_secs(1));
        retry_with_backoff(policy, |_: &PipelineError| true, |_attempt| async {
            self.rpc
                .get_transaction(&parsed_signature)
                .await
                .map_err(|e| classify_rpc_error(&e))
        })
        .await
    }
}

fn is_permanent_fetch_error(err: &PipelineError) -> bool {
    matches!(err, PipelineError::Validation(_)) || matches!(err, PipelineError::Rpc(_)) && !err.is_retryable()
}

fn classify_rpc_error(message: &str) -> PipelineError {
    let lowered = message.to_lowercase();
    if lowered.contains("not found") || lowered.contains("invalid signature") {
        PipelineError::rpc_not_found(message)
    } else {
        PipelineError::network(message)
    }
}

fn sample_logs(tx: &EncodedConfirmedTransactionWithStatusMeta, limit: usize) -> Vec<String> {
    match tx.transaction.meta.as_ref().map(|m| &m.log_messages) {
        Some(OptionSerializer::Some(logs)) => logs.iter().take(limit).cloned().collect(),
        _ => Vec::new(),
    }
}

fn derive_status(meta: &UiTransactionStatusMeta) -> TxStatus {
    if meta.err.is_some() {
        TxStatus::Failed
    } else {
        TxStatus::Success
    }
}

fn option_vec<T: Clone>(opt: &OptionSerializer<Vec<T>>) -> Vec<T> {
    match opt {
        OptionSerializer::Some(v) => v.clone(),
        _ => Vec::new(),
    }
}

fn account_keys(tx: &EncodedConfirmedTransactionWithStatusMeta) -> Vec<String> {
    use solana_transaction_status::{EncodedTransaction, UiMessage};
    match &tx.transaction.transaction {
        EncodedTransaction::Json(ui_tx) => match &ui_tx.message {
            UiMessage::Parsed(m) => m.account_keys.iter().map(|a| a.pubkey.clone()).collect(),
            UiMessage::Raw(m) => m.account_keys.clone(),
        },
        _ => Vec::new(),
    }
}

/// Diffs `pre_balances`/`post_balances` (lamports) per account index and
/// surfaces the single largest positive delta as the transaction's native
/// SOL transfer. Every other nonzero delta (fee deductions, the sender's
/// matching negative leg) is noise for this purpose and is ignored — only
/// the account that actually received SOL gets a row, mapped to the
/// wrapped-native mint.
fn native_transfers(meta: &UiTransactionStatusMeta, tx: &EncodedConfirmedTransactionWithStatusMeta) -> Vec<(TokenTransfer, u8)> {
    let keys = account_keys(tx);
    let len = meta.pre_balances.len().max(meta.post_balances.len());

    let mut best_idx = None;
    let mut best_delta = 0i128;

    for idx in 0..len {
        let pre = meta.pre_balances.get(idx).copied().unwrap_or(0) as i128;
        let post = meta.post_balances.get(idx).copied().unwrap_or(0) as i128;
        let delta = post - pre;
        if delta > best_delta {
            best_delta = delta;
            best_idx = Some(idx);
        }
    }

    let Some(idx) = best_idx else {
        return Vec::new();
    };

    let owner = keys.get(idx).cloned().unwrap_or_default();
    vec![(
        TokenTransfer {
            owner_account: owner,
            mint: NATIVE_SOL_MINT.to_string(),
            delta_amount: best_delta.unsigned_abs() as u64,
            direction: Direction::In,
        },
        DEFAULT_DECIMALS,
    )]
}

struct TokenBalanceEntry {
    mint: String,
    owner: String,
    amount: u64,
    decimals: u8,
}

fn token_balance_map(balances: &[UiTransactionTokenBalance]) -> HashMap<u8, TokenBalanceEntry> {
    balances
        .iter()
        .map(|b| {
            let owner = match &b.owner {
                OptionSerializer::Some(o) => o.clone(),
                _ => String::new(),
            };
            let amount = b.ui_token_amount.amount.parse::<u64>().unwrap_or(0);
            (b.account_index, TokenBalanceEntry { mint: b.mint.clone(), owner, amount, decimals: b.ui_token_amount.decimals })
        })
        .collect()
}

/// Diffs pre/post SPL token balances per account index. An account present
/// in only one of the two snapshots (an ATA created or closed mid-transaction)
/// is treated as a transfer from/to zero.
fn spl_transfers(meta: &UiTransactionStatusMeta) -> Vec<(TokenTransfer, u8)> {
    let pre_map = token_balance_map(&option_vec(&meta.pre_token_balances));
    let post_map = token_balance_map(&option_vec(&meta.post_token_balances));

    let mut indices: Vec<u8> = pre_map.keys().chain(post_map.keys()).copied().collect();
    indices.sort_unstable();
    indices.dedup();

    let mut out = Vec::new();
    for idx in indices {
        let pre = pre_map.get(&idx);
        let post = post_map.get(&idx);

        let (mint, owner, decimals) = match (pre, post) {
            (_, Some(entry)) => (entry.mint.clone(), entry.owner.clone(), entry.decimals),
            (Some(entry), None) => (entry.mint.clone(), entry.owner.clone(), entry.decimals),
            (None, None) => continue,
        };

        let pre_amount = pre.map(|e| e.amount).unwrap_or(0) as i128;
        let post_amount = post.map(|e| e.amount).unwrap_or(0) as i128;
        let delta = post_amount - pre_amount;
        if delta == 0 {
            continue;
        }

        let direction = if delta > 0 { Direction::In } else { Direction::Out };
        out.push((TokenTransfer { owner_account: owner, mint, delta_amount: delta.unsigned_abs() as u64, direction }, decimals));
    }

    out
}

fn build_row(
    msg: &IngestMessage,
    event: &crate::model::DlnEvent,
    transfer: &TokenTransfer,
    decimals: u8,
    status: TxStatus,
    prices: &HashMap<String, f64>,
    now: i64,
) -> AnalyticsRow {
    let ui_amount = transfer.delta_amount as f64 / 10f64.powi(decimals as i32);
    let price = prices.get(&transfer.mint).copied().unwrap_or(0.0);
    let instruction_type = match (event.event_type, transfer.direction) {
        (EventType::OrderFulfilled, Direction::In) => InstructionType::Receive,
        (EventType::OrderFulfilled, Direction::Out) => InstructionType::Send,
        (EventType::OrderCreated, Direction::Out) => InstructionType::Send,
        (EventType::OrderCreated, Direction::In) => InstructionType::Receive,
    };

    AnalyticsRow {
        signature: msg.signature.clone(),
        slot: msg.slot,
        block_time: msg.block_time.unwrap_or(event.block_time),
        program_id: msg.program_id.clone(),
        account: transfer.owner_account.clone(),
        token_mint: transfer.mint.clone(),
        amount: transfer.delta_amount.to_string(),
        amount_usd: ui_amount * price,
        status,
        instruction_type,
        event_type: event.event_type.as_str().to_string(),
        order_id: event.order_id.clone(),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_fetch_errors_are_detected() {
        assert!(is_permanent_fetch_error(&PipelineError::rpc_not_found("transaction not found")));
        assert!(is_permanent_fetch_error(&PipelineError::validation("invalid signature")));
        assert!(!is_permanent_fetch_error(&PipelineError::Network("timeout".to_string())));
    }

    #[test]
    fn classify_rpc_error_detects_not_found() {
        assert!(matches!(classify_rpc_error("Transaction not found"), PipelineError::Rpc(_)));
        assert!(matches!(classify_rpc_error("connection reset"), PipelineError::Network(_)));
    }
}
