use std::fmt;
use std::ops::Deref;
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Length field: 8 ASCII bytes, decimal, left-justified, space-padded.
pub const LENGTH_FIELD_SIZE: usize = 8;

/// Largest payload an 8-digit decimal length field can describe.
pub const MAX_LENGTH_FIELD_VALUE: usize = 99_999_999;

/// Default maximum payload size: whatever the length field can carry.
pub const DEFAULT_MAX_PAYLOAD: usize = MAX_LENGTH_FIELD_VALUE;

/// Token separator used by the backend.
pub const DEFAULT_SEPARATOR: &str = "[]:[]";

/// Short acknowledgement token.
pub const ACK: &str = "OK";

/// An ordered list of string tokens exchanged with the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    tokens: Vec<String>,
}

impl Message {
    /// Create a message from anything that yields tokens.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// The short `["OK"]` acknowledgement.
    pub fn ack() -> Self {
        Self::new([ACK])
    }

    /// Borrow the tokens.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Consume the message and return its tokens.
    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }

    /// Token at `index`, if present.
    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    /// True when the first token is `OK` (any case).
    pub fn is_ok(&self) -> bool {
        self.tokens
            .first()
            .is_some_and(|token| token.eq_ignore_ascii_case(ACK))
    }

    /// Byte length of the joined payload.
    pub fn payload_len(&self, separator: &str) -> usize {
        let tokens: usize = self.tokens.iter().map(String::len).sum();
        tokens + separator.len() * self.tokens.len().saturating_sub(1)
    }

    /// The total wire size of this message (length field + payload).
    pub fn wire_size(&self, separator: &str) -> usize {
        LENGTH_FIELD_SIZE + self.payload_len(separator)
    }
}

impl Deref for Message {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.tokens
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.tokens)
    }
}

/// Join tokens with the separator.
pub fn join_tokens<S: AsRef<str>>(tokens: &[S], separator: &str) -> String {
    let mut joined = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            joined.push_str(separator);
        }
        joined.push_str(token.as_ref());
    }
    joined
}

/// Encode tokens into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────┬──────────────────────────────────────┐
/// │ Length (8B ASCII)        │ Payload                              │
/// │ decimal, left-justified, │ tok1 [sep] tok2 [sep] ... tokN       │
/// │ space-padded             │ (Length bytes)                       │
/// └──────────────────────────┴──────────────────────────────────────┘
/// ```
pub fn encode_message<S: AsRef<str>>(
    tokens: &[S],
    separator: &str,
    dst: &mut BytesMut,
) -> Result<()> {
    let payload = join_tokens(tokens, separator);
    if payload.len() > MAX_LENGTH_FIELD_VALUE {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_LENGTH_FIELD_VALUE,
        });
    }

    let length_field = format!("{:<width$}", payload.len(), width = LENGTH_FIELD_SIZE);
    dst.reserve(LENGTH_FIELD_SIZE + payload.len());
    dst.put_slice(length_field.as_bytes());
    dst.put_slice(payload.as_bytes());
    Ok(())
}

/// What a reply's length field announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// The `OK` short acknowledgement; no payload follows.
    Ack,
    /// A payload of this many bytes follows.
    Length(usize),
}

/// Interpret the bytes read in place of a length field.
///
/// `header` is normally the full 8 bytes; it is shorter only when the peer
/// closed the socket early. A field that is exactly `OK` (any case, padding
/// ignored) is the backend's short acknowledgement.
pub fn decode_header(header: &[u8]) -> Result<Header> {
    let invalid = || FrameError::InvalidLength(String::from_utf8_lossy(header).into_owned());
    let text = std::str::from_utf8(header).map_err(|_| invalid())?.trim();
    if text.eq_ignore_ascii_case(ACK) {
        return Ok(Header::Ack);
    }

    text.parse::<usize>().map(Header::Length).map_err(|_| invalid())
}

/// Split a payload into tokens.
///
/// An empty payload is one empty token, mirroring how the backend joins.
pub fn split_payload(payload: &[u8], separator: &str) -> Vec<String> {
    String::from_utf8_lossy(payload)
        .split(separator)
        .map(String::from)
        .collect()
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the message bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Message>> {
    if src.len() < LENGTH_FIELD_SIZE {
        return Ok(None); // Need more data
    }

    let payload_len = match decode_header(&src[..LENGTH_FIELD_SIZE])? {
        Header::Ack => {
            src.advance(LENGTH_FIELD_SIZE);
            return Ok(Some(Message::ack()));
        }
        Header::Length(len) => len,
    };

    if payload_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: config.max_payload_size,
        });
    }

    if src.len() < LENGTH_FIELD_SIZE + payload_len {
        return Ok(None); // Need more data
    }

    src.advance(LENGTH_FIELD_SIZE);
    let payload = src.split_to(payload_len);
    Ok(Some(Message::new(split_payload(&payload, &config.separator))))
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Token separator. Default: `[]:[]`.
    pub separator: String,
    /// Maximum payload size in bytes. Default: 99,999,999.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations. Default: none.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations. Default: none.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
