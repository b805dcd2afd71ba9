//! Feed Codec
//!
//! Decodes inbound Massive payloads into record sequences. The feed
//! sends JSON arrays of records; a lone object is coerced into a
//! one-element sequence.
//!
//! Decoding is deliberately lossy at the record level: a record with
//! an unknown `ev` tag, or one whose fields do not fit its tag's
//! schema, is skipped rather than failing the payload. Only a payload
//! that is not valid JSON (or not an array/object) is an error, and
//! the gateway drops those silently too.

use super::messages::{AggregateMessage, MassiveRecord, StatusMessage, TradeMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Payload is not valid JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is valid JSON but neither an array nor an object.
    #[error("invalid payload format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the Massive feed.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text payload into a sequence of records.
    ///
    /// Unknown or malformed records inside a well-formed payload are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON or is a bare
    /// scalar.
    pub fn decode(&self, text: &str) -> Result<Vec<MassiveRecord>, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        let items = match value {
            serde_json::Value::Array(items) => items,
            lone @ serde_json::Value::Object(_) => vec![lone],
            other => {
                return Err(CodecError::InvalidFormat(format!(
                    "expected JSON array or object, got {other}"
                )));
            }
        };

        Ok(items.into_iter().filter_map(decode_record).collect())
    }
}

/// Decode one record by its `ev` tag; `None` skips the record.
fn decode_record(value: serde_json::Value) -> Option<MassiveRecord> {
    let ev = value.get("ev").and_then(serde_json::Value::as_str)?;

    match ev {
        "status" => serde_json::from_value::<StatusMessage>(value)
            .ok()
            .map(MassiveRecord::Status),
        "AM" => serde_json::from_value::<AggregateMessage>(value)
            .ok()
            .map(MassiveRecord::Aggregate),
        "T" => serde_json::from_value::<TradeMessage>(value)
            .ok()
            .map(MassiveRecord::Trade),
        _ => None,
    }
}
