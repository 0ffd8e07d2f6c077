/// Event Parser (C3): turns a fetched transaction into a typed `DlnEvent`.
///
/// Every protocol event is tied together by an `orderId` recovered from log
/// messages rather than from a decoded account layout — the indexed program
/// is opaque to `jsonParsed` encoding for most RPC providers, so log-scanning
/// is the only reliable extraction path. Instruction-level argument decoding
/// is attempted when accounts/data are available and falls back to an empty
/// payload otherwise; the worker still persists token transfers in that case.
use crate::model::{DlnEvent, EventData, EventType};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, UiInstruction, UiMessage,
    UiParsedInstruction, UiTransactionStatusMeta,
};

static PATTERN_ORDER_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)orderid:\s*(?:0x)?([a-f0-9]{64})").expect("invalid regex"));
static PATTERN_ORDER_CREATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)order\s+created:\s*(?:0x)?([a-f0-9]{64})").expect("invalid regex"));
static PATTERN_ORDER_FULFILLED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)order\s+fulfilled:\s*(?:0x)?([a-f0-9]{64})").expect("invalid regex"));
static PATTERN_ORDER_ID_KV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)orderid["\s:=]+(?:0x)?([a-f0-9]{64})"#).expect("invalid regex"));
static PATTERN_ORDER_ID_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)order\s+id:\s*([0-9]{10,})").expect("invalid regex"));

/// Try each orderId pattern in spec order, returning the first (lowercased)
/// match. Pattern 6 (base64 "Program data: " payload) is handled separately
/// since it isn't a regex capture.
fn extract_order_id(logs: &[String]) -> Option<String> {
    for log in logs {
        if let Some(caps) = PATTERN_ORDER_ID.captures(log) {
            return Some(caps[1].to_lowercase());
        }
        if let Some(caps) = PATTERN_ORDER_CREATED.captures(log) {
            return Some(caps[1].to_lowercase());
        }
        if let Some(caps) = PATTERN_ORDER_FULFILLED.captures(log) {
            return Some(caps[1].to_lowercase());
        }
        if let Some(caps) = PATTERN_ORDER_ID_KV.captures(log) {
            return Some(caps[1].to_lowercase());
        }
        if let Some(caps) = PATTERN_ORDER_ID_DECIMAL.captures(log) {
            return Some(caps[1].to_string());
        }
    }
    for log in logs {
        if let Some(order_id) = extract_order_id_from_program_data(log) {
            return Some(order_id);
        }
    }
    None
}

fn extract_order_id_from_program_data(log: &str) -> Option<String> {
    let payload = log.strip_prefix("Program data: ")?;
    let bytes = BASE64.decode(payload.trim()).ok()?;
    if bytes.len() < 40 {
        return None;
    }
    let candidate = &bytes[8..40];
    if candidate.iter().all(|b| *b == 0x00) || candidate.iter().all(|b| *b == 0xff) {
        return None;
    }
    Some(hex_encode(candidate))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Instruction-name-based classification when the RPC response decodes
/// instructions (jsonParsed/partiallyDecoded); falls back to `None` when the
/// program is opaque, which the caller resolves via log-scanning.
fn classify_from_instructions(meta_message: Option<&UiMessage>) -> Option<EventType> {
    let message = meta_message?;
    // Raw (non-jsonParsed) messages carry only opaque instruction bytes; only
    // the parsed encoding can name an instruction directly.
    let UiMessage::Parsed(parsed_message) = message else {
        return None;
    };
    for instr in &parsed_message.instructions {
        if let UiInstruction::Parsed(UiParsedInstruction::Parsed(instruction)) = instr {
            if let Some(ty) = instruction.parsed.get("type").and_then(|v| v.as_str()) {
                if let Some(event) = classify_instruction_name(ty) {
                    return Some(event);
                }
            }
        }
    }
    None
}

fn classify_instruction_name(name: &str) -> Option<EventType> {
    let lowered = name.to_lowercase();
    match lowered.as_str() {
        "createorder" | "create_order" | "createorderwithnonce" => Some(EventType::OrderCreated),
        "fulfillorder" | "fulfill_order" => Some(EventType::OrderFulfilled),
        _ => None,
    }
}

fn classify_from_logs(logs: &[String]) -> Option<EventType> {
    for log in logs {
        let lowered = log.to_lowercase();
        if lowered.contains("order created")
            || lowered.contains("ordercreated")
            || lowered.contains("instruction: createorder")
            || lowered.contains("instruction: createorderwithnonce")
        {
            return Some(EventType::OrderCreated);
        }
        if lowered.contains("order fulfilled")
            || lowered.contains("orderfulfilled")
            || lowered.contains("instruction: fulfillorder")
        {
            return Some(EventType::OrderFulfilled);
        }
    }
    None
}

fn log_messages(meta: &UiTransactionStatusMeta) -> Vec<String> {
    match &meta.log_messages {
        OptionSerializer::Some(logs) => logs.clone(),
        _ => Vec::new(),
    }
}

fn parsed_message(tx: &EncodedTransaction) -> Option<&UiMessage> {
    match tx {
        EncodedTransaction::Json(ui_tx) => Some(&ui_tx.message),
        _ => None,
    }
}

/// Best-effort account-name lookup against a parsed message's account keys,
/// by position, for the program's own accounts (instruction-local indices).
/// Empty for opaque/partially-decoded instructions, which is the common case
/// for a program with no publicly known IDL.
fn account_at(message: Option<&UiMessage>, index: usize) -> Option<String> {
    let message = message?;
    let keys = match message {
        UiMessage::Parsed(m) => &m.account_keys,
        UiMessage::Raw(m) => {
            return m.account_keys.get(index).cloned();
        }
    };
    keys.get(index).map(|k| k.pubkey.clone())
}

fn build_event_data(event_type: EventType, message: Option<&UiMessage>) -> EventData {
    let mut data = EventData::default();
    match event_type {
        EventType::OrderCreated => {
            data.maker = account_at(message, 0);
            data.give_token = account_at(message, 1);
            data.take_token = account_at(message, 2);
            data.receiver = account_at(message, 3);
            data.allowed_taker = account_at(message, 4);
            data.allowed_cancel_beneficiary = account_at(message, 5);
        }
        EventType::OrderFulfilled => {
            data.fulfiller = account_at(message, 0);
            data.order_beneficiary = account_at(message, 1);
            data.unlock_beneficiary = account_at(message, 2);
        }
    }
    data
}

/// Parse a fetched transaction into a `DlnEvent`, or `None` if no orderId or
/// no event type could be determined. Never errors: an unparseable
/// transaction is simply skipped by the worker.
pub fn parse_event(tx: &EncodedConfirmedTransactionWithStatusMeta, signature: &str) -> Option<DlnEvent> {
    let meta = tx.transaction.meta.as_ref()?;
    let logs = log_messages(meta);
    let order_id = extract_order_id(&logs)?;

    let message = parsed_message(&tx.transaction.transaction);
    let event_type = classify_from_instructions(message).or_else(|| classify_from_logs(&logs))?;

    let data = build_event_data(event_type, message);
    Some(DlnEvent {
        event_type,
        order_id,
        signature: signature.to_string(),
        slot: tx.slot,
        block_time: tx.block_time.unwrap_or(0),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_order_id_from_plain_log() {
        let hex = "a".repeat(64);
        let logs = vec![format!("Program log: OrderId: 0x{}", hex)];
        assert_eq!(extract_order_id(&logs).unwrap(), hex);
    }

    #[test]
    fn extracts_decimal_order_id() {
        let logs = vec!["Program log: Order Id: 1234567890123".to_string()];
        assert_eq!(extract_order_id(&logs).unwrap(), "1234567890123");
    }

    #[test]
    fn no_match_returns_none() {
        let logs = vec!["Program log: nothing interesting here".to_string()];
        assert!(extract_order_id(&logs).is_none());
    }

    #[test]
    fn program_data_fallback_rejects_all_zero() {
        let mut bytes = vec![0u8; 40];
        bytes[0] = 1;
        let encoded = BASE64.encode(&bytes);
        let log = format!("Program data: {}", encoded);
        assert!(extract_order_id_from_program_data(&log).is_none());
    }

    #[test]
    fn program_data_fallback_accepts_nontrivial_payload() {
        let mut bytes = vec![0u8; 40];
        for (i, b) in bytes.iter_mut().enumerate().skip(8) {
            *b = i as u8;
        }
        let encoded = BASE64.encode(&bytes);
        let log = format!("Program data: {}", encoded);
        let order_id = extract_order_id_from_program_data(&log).unwrap();
        assert_eq!(order_id.len(), 64);
    }

    #[test]
    fn classifies_created_from_log_fallback() {
        let logs = vec!["Program log: Instruction: CreateOrder".to_string()];
        assert_eq!(classify_from_logs(&logs), Some(EventType::OrderCreated));
    }

    #[test]
    fn classifies_fulfilled_from_log_fallback() {
        let logs = vec!["Program log: Order fulfilled successfully".to_string()];
        assert_eq!(classify_from_logs(&logs), Some(EventType::OrderFulfilled));
    }

    #[test]
    fn classify_instruction_name_matches_known_variants() {
        assert_eq!(classify_instruction_name("createOrderWithNonce"), Some(EventType::OrderCreated));
        assert_eq!(classify_instruction_name("FulfillOrder"), Some(EventType::OrderFulfilled));
        assert_eq!(classify_instruction_name("cancelOrder"), None);
    }
}
