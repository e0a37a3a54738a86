// Payload decoding: structured binary, JSON, heuristic fallback

mod binary;
mod heuristic;


pub use binary::{encode, EncodeError};

use crate::robot::Channel;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

/// Payload unreadable even heuristically. The only way to hit this is an
/// empty buffer; the heuristic path otherwise always succeeds.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,
}

/// Which decode path produced the field map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadEncoding {
    Binary,
    Json,
    Heuristic,
}

/// Loosely-typed result of decoding one raw payload.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedPayload {
    pub fields: Map<String, Value>,
    /// True when only the heuristic scan ran; the field set is best-effort
    /// and absence of a field is not an error.
    pub partial: bool,
    pub encoding: PayloadEncoding,
}

/// Decode a raw byte payload for one channel.
///
/// Attempts the compact binary frame first, then a JSON object, then the
/// heuristic label scan over the lossy UTF-8 decoding of the bytes. The
/// production fleet mixes encodings per firmware version; a channel must
/// never be dropped entirely on decode failure, so the heuristic path
/// always succeeds (possibly with an empty field set).
pub fn decode(bytes: &[u8], channel: Channel) -> Result<DecodedPayload, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    if let Ok(fields) = binary::decode_frame(bytes) {
        return Ok(DecodedPayload {
            fields,
            partial: false,
            encoding: PayloadEncoding::Binary,
        });
    }

    if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(bytes) {
        return Ok(DecodedPayload {
            fields,
            partial: false,
            encoding: PayloadEncoding::Json,
        });
    }

    let text = String::from_utf8_lossy(bytes);
    let fields = heuristic::scan(&text, heuristic::labels_for(channel));

    trace!(
        channel = %channel,
        found = fields.len(),
        "Heuristic decode of unrecognized payload"
    );

    Ok(DecodedPayload {
        fields,
        partial: true,
        encoding: PayloadEncoding::Heuristic,
    })
}
