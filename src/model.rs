/// Core data model shared by every pipeline component (see the data-model
/// section of the design doc): ingest messages, DLN events, token transfers,
/// and analytics rows.
use serde::{Deserialize, Serialize};

/// Where an ingest message originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    History,
    Realtime,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::History => write!(f, "history"),
            Source::Realtime => write!(f, "realtime"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// The message carried by the transaction bus (C1) from producer to worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMessage {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub source: Source,
    pub program_id: String,
    pub enqueued_at: i64,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub priority: Priority,
}

impl IngestMessage {
    pub fn validate(&self) -> Result<(), String> {
        if self.signature.is_empty() {
            return Err("signature must not be empty".to_string());
        }
        if self.program_id.is_empty() {
            return Err("programId must not be empty".to_string());
        }
        Ok(())
    }
}

/// The two protocol events this pipeline recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    OrderCreated,
    OrderFulfilled,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderCreated => "OrderCreated",
            EventType::OrderFulfilled => "OrderFulfilled",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event-type-specific payload. Fields unused by a given variant stay unset
/// rather than forcing every field onto every event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventData {
    pub maker: Option<String>,
    pub give_chain_id: Option<u64>,
    pub take_chain_id: Option<u64>,
    pub give_token: Option<String>,
    pub take_token: Option<String>,
    pub give_amount: Option<u64>,
    pub take_amount: Option<u64>,
    pub receiver: Option<String>,
    pub allowed_taker: Option<String>,
    pub allowed_cancel_beneficiary: Option<String>,
    pub expiry_slot: Option<u64>,
    pub affiliate_fee: Option<u64>,
    pub fulfiller: Option<String>,
    pub order_beneficiary: Option<String>,
    pub unlock_beneficiary: Option<String>,
}

/// A classified protocol event extracted from a transaction by C3.
///
/// `orderId` is always 64-char lowercase hex or a 10+ digit decimal string;
/// an event with no derivable orderId must never be constructed (use
/// `Option<DlnEvent>` at the call site instead).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlnEvent {
    pub event_type: EventType,
    pub order_id: String,
    pub signature: String,
    pub slot: u64,
    pub block_time: i64,
    pub data: EventData,
}

/// Direction of a token movement relative to the owning account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// A single token movement derived from pre/post balance diffing.
#[derive(Debug, Clone)]
pub struct TokenTransfer {
    pub owner_account: String,
    pub mint: String,
    pub delta_amount: u64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
    Pending,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Success => "success",
            TxStatus::Failed => "failed",
            TxStatus::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionType {
    Receive,
    Send,
    Unknown,
}

impl InstructionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionType::Receive => "receive",
            InstructionType::Send => "send",
            InstructionType::Unknown => "unknown",
        }
    }
}

/// One row of the analytics table (C9). Primary key is
/// `(signature, account, programId)`; the store resolves duplicate keys by
/// greatest `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRow {
    pub signature: String,
    pub slot: u64,
    pub block_time: i64,
    pub program_id: String,
    pub account: String,
    pub token_mint: String,
    /// Absolute amount in base units, stored as a string to avoid precision
    /// loss for amounts that exceed `f64`'s safe integer range.
    pub amount: String,
    pub amount_usd: f64,
    pub status: TxStatus,
    pub instruction_type: InstructionType,
    pub event_type: String,
    pub order_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl AnalyticsRow {
    /// A single placeholder row emitted when a recognized event carried no
    /// token transfers.
    pub fn placeholder(
        signature: &str,
        slot: u64,
        block_time: i64,
        program_id: &str,
        status: TxStatus,
        event_type: &str,
        order_id: &str,
        now: i64,
    ) -> Self {
        Self {
            signature: signature.to_string(),
            slot,
            block_time,
            program_id: program_id.to_string(),
            account: String::new(),
            token_mint: String::new(),
            amount: "0".to_string(),
            amount_usd: 0.0,
            status,
            instruction_type: InstructionType::Unknown,
            event_type: event_type.to_string(),
            order_id: order_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_message_requires_signature_and_program_id() {
        let msg = IngestMessage {
            signature: String::new(),
            slot: 1,
            block_time: None,
            source: Source::History,
            program_id: "Prog".to_string(),
            enqueued_at: 0,
            attempt: 0,
            priority: Priority::Normal,
        };
        assert!(msg.validate().is_err());
    }

    #[test]
    fn placeholder_row_has_unknown_instruction_type() {
        let row = AnalyticsRow::placeholder(
            "sig",
            1,
            0,
            "Prog",
            TxStatus::Success,
            "OrderCreated",
            "abc",
            1000,
        );
        assert_eq!(row.instruction_type, InstructionType::Unknown);
        assert_eq!(row.account, "");
        assert_eq!(row.amount, "0");
    }
}
