/// Analytics Store Writer (C9).
///
/// A thin wrapper around the ClickHouse client that writes `AnalyticsRow`s to
/// the `transactions` table with async-insert enabled and waits for the
/// server's async-insert acknowledgment before returning. The table engine
/// (`ReplacingMergeTree` keyed on `(signature, account, program_id)`, version
/// column `updated_at`) is what actually deduplicates re-inserted rows — this
/// writer never retries and never de-duplicates client-side.
use crate::errors::PipelineError;
use crate::model::AnalyticsRow;
use clickhouse::{Client, Row};
use serde::Serialize;

#[derive(Row, Serialize)]
struct TransactionRow {
    signature: String,
    slot: u64,
    block_time: i64,
    program_id: String,
    account: String,
    token_mint: String,
    amount: String,
    amount_usd: f64,
    status: String,
    instruction_type: String,
    event_type: String,
    order_id: String,
    created_at: i64,
    updated_at: i64,
}

impl From<&AnalyticsRow> for TransactionRow {
    fn from(row: &AnalyticsRow) -> Self {
        Self {
            signature: row.signature.clone(),
            slot: row.slot,
            block_time: row.block_time,
            program_id: row.program_id.clone(),
            account: row.account.clone(),
            token_mint: row.token_mint.clone(),
            amount: row.amount.clone(),
            amount_usd: row.amount_usd,
            status: row.status.as_str().to_string(),
            instruction_type: row.instruction_type.as_str().to_string(),
            event_type: row.event_type.clone(),
            order_id: row.order_id.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct AnalyticsStore {
    client: Client,
}

impl AnalyticsStore {
    pub fn new(url: &str, database: &str, user: &str, password: &str) -> Self {
        let mut client = Client::default()
            .with_url(url)
            .with_database(database)
            .with_option("wait_for_async_insert", "1")
            .with_option("async_insert", "1");
        if !user.is_empty() {
            client = client.with_user(user);
        }
        if !password.is_empty() {
            client = client.with_password(password);
        }
        Self { client }
    }

    /// Writes every row in one batch. The server accepts the whole insert
    /// atomically; callers never see a partial write.
    pub async fn insert(&self, rows: &[AnalyticsRow]) -> Result<(), PipelineError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut insert = self
            .client
            .insert("transactions")
            .map_err(|e| PipelineError::analytics(e.to_string()))?;
        for row in rows {
            let converted: TransactionRow = row.into();
            insert
                .write(&converted)
                .await
                .map_err(|e| PipelineError::analytics(e.to_string()))?;
        }
        insert.end().await.map_err(|e| PipelineError::analytics(e.to_string()))
    }

    /// Fallback source of truth for the Mode Coordinator (C6) when the
    /// Redis processed-count key is absent: the number of distinct
    /// signatures already recorded for the program.
    pub async fn count_distinct_signatures(&self, program_id: &str) -> Result<u64, PipelineError> {
        self.client
            .query("SELECT count(DISTINCT signature) FROM transactions WHERE program_id = ?")
            .bind(program_id)
            .fetch_one::<u64>()
            .await
            .map_err(|e| PipelineError::analytics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstructionType, TxStatus};

    #[test]
    fn converts_analytics_row_to_wire_row() {
        let row = AnalyticsRow {
            signature: "sig".to_string(),
            slot: 1,
            block_time: 100,
            program_id: "Prog".to_string(),
            account: "Acc".to_string(),
            token_mint: "Mint".to_string(),
            amount: "1000".to_string(),
            amount_usd: 1.5,
            status: TxStatus::Success,
            instruction_type: InstructionType::Receive,
            event_type: "OrderCreated".to_string(),
            order_id: "abc".to_string(),
            created_at: 100,
            updated_at: 100,
        };
        let wire: TransactionRow = (&row).into();
        assert_eq!(wire.status, "success");
        assert_eq!(wire.instruction_type, "receive");
    }
}
