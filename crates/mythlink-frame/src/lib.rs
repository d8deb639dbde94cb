//! Length-prefixed token framing for the backend protocol.
//!
//! Every message on a command socket is framed as:
//! - An 8-byte ASCII decimal length, left-justified and space-padded
//! - The payload: the message tokens joined by the separator (`[]:[]`)
//!
//! The backend can only carry 32-bit integers in a token, so 64-bit values
//! travel as two tokens; [`longlong`] splits and recombines them.
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod longlong;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_header, decode_message, encode_message, join_tokens, split_payload, FrameConfig,
    Header, Message, ACK, DEFAULT_MAX_PAYLOAD, DEFAULT_SEPARATOR, LENGTH_FIELD_SIZE,
    MAX_LENGTH_FIELD_VALUE,
};
pub use error::{FrameError, Result};
pub use reader::MessageReader;
pub use writer::MessageWriter;

/// Tracing target for wire-level traffic.
pub const WIRE_TARGET: &str = "mythlink::wire";
