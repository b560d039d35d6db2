//! Message encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! Messages are bincode-encoded with variable-length integers. The enum
//! variant index doubles as the message type tag, so no separate header is
//! needed. Payloads larger than [`MAX_MESSAGE_BYTES`] are refused in both
//! directions.

use crate::Message;
use bincode::Options;
use thiserror::Error;

/// Upper bound on an encoded message.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message too short")]
    MessageTooShort,

    #[error("Message of {0} bytes exceeds the size limit")]
    TooLarge(usize),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_MESSAGE_BYTES as u64)
}

/// Encode a message to wire format.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, CodecError> {
    options().serialize(message).map_err(|e| match *e {
        bincode::ErrorKind::SizeLimit => CodecError::TooLarge(MAX_MESSAGE_BYTES),
        other => CodecError::Encode(other.to_string()),
    })
}

/// Decode a message from wire format.
pub fn decode_message(data: &[u8]) -> Result<Message, CodecError> {
    if data.is_empty() {
        return Err(CodecError::MessageTooShort);
    }
    if data.len() > MAX_MESSAGE_BYTES {
        return Err(CodecError::TooLarge(data.len()));
    }
    options()
        .deserialize(data)
        .map_err(|e| CodecError::Decode(e.to_string()))
}
