//! Network messages for the consensus and synchronization protocols.

mod codec;
mod message;
mod reason;

pub use codec::{decode_message, encode_message, CodecError, MAX_MESSAGE_BYTES};
pub use message::Message;
pub use reason::ReasonCode;
