//! Wire types and decoding helpers for the JSON-RPC chain client.

use serde::Deserialize;

use crate::monitor::range_event::RangeEvent;

/// Size of one ABI-encoded word in a log's data payload.
const WORD_BYTES: usize = 32;

/// One log entry as returned by `eth_getLogs`.
///
/// Only the field the monitor consumes is modeled; the event payload lives
/// entirely in `data` since the update event's parameters are not indexed.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    /// ABI-encoded event payload: consecutive 32-byte words, hex encoded.
    pub data: String,
}

/// Error types for chain RPC operations
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("no result in RPC response")]
    NoResult,

    #[error("malformed hex quantity: {0}")]
    InvalidQuantity(String),

    #[error("malformed log data: {0}")]
    InvalidLogData(String),
}

/// Parse a JSON-RPC hex quantity (`"0x10"` -> 16).
pub fn parse_quantity(quantity: &str) -> Result<u64, RpcError> {
    let digits = strip_hex_prefix(quantity);
    if digits.is_empty() {
        return Err(RpcError::InvalidQuantity(quantity.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| RpcError::InvalidQuantity(quantity.to_string()))
}

/// Render a height as a JSON-RPC hex quantity.
pub fn to_quantity(value: u64) -> String {
    format!("{:#x}", value)
}

/// Decode one update log's data payload into a range event.
///
/// The update event carries four unindexed words; word 0 is the range start
/// and word 3 the finalized count. The remaining words (state roots) are not
/// needed for coverage tracking.
pub fn decode_range_event(data: &str) -> Result<RangeEvent, RpcError> {
    let raw = hex::decode(strip_hex_prefix(data))
        .map_err(|e| RpcError::InvalidLogData(format!("{}: {}", data, e)))?;
    let start_block = decode_word(&raw, 0)?;
    let num_finalized = decode_word(&raw, 3)?;
    Ok(RangeEvent::new(start_block, num_finalized))
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Extract word `index` from an ABI data payload as a `u64`.
///
/// Heights far exceed what a contract emits in practice, so a word with any
/// of its high 24 bytes set is rejected rather than silently truncated.
fn decode_word(raw: &[u8], index: usize) -> Result<u64, RpcError> {
    let offset = index * WORD_BYTES;
    let word = raw
        .get(offset..offset + WORD_BYTES)
        .ok_or_else(|| RpcError::InvalidLogData(format!("data too short for word {}", index)))?;

    let (high, low) = word.split_at(WORD_BYTES - 8);
    if high.iter().any(|&byte| byte != 0) {
        return Err(RpcError::InvalidLogData(format!(
            "word {} exceeds 64 bits",
            index
        )));
    }

    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    Ok(u64::from_be_bytes(buf))
}
