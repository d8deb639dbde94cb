//! Split and recombine 64-bit integers carried as two 32-bit tokens.
//!
//! The backend protocol only transports 32-bit integers, so file sizes,
//! frame counters and bookmarks travel as a (low, high) pair of decimal
//! tokens. Which token comes first differs from command to command; call
//! sites name the order explicitly.

use crate::error::{FrameError, Result};

/// Split `value` into `(low, high)` 32-bit halves.
pub fn encode(value: u64) -> (u32, u32) {
    ((value & 0xFFFF_FFFF) as u32, (value >> 32) as u32)
}

/// Combine `(low, high)` 32-bit halves into one value.
pub fn decode(low: u32, high: u32) -> u64 {
    u64::from(low) | (u64::from(high) << 32)
}

/// Split `value` into decimal `(low, high)` tokens.
pub fn encode_tokens(value: u64) -> (String, String) {
    let (low, high) = encode(value);
    (low.to_string(), high.to_string())
}

/// Parse decimal `(low, high)` tokens and combine them.
pub fn parse(low: &str, high: &str) -> Result<u64> {
    Ok(decode(parse_low(low)?, parse_high(high)?))
}

/// The low half is sent as a signed 32-bit integer by some backends, so a
/// negative token is reinterpreted as its two's-complement bit pattern.
fn parse_low(token: &str) -> Result<u32> {
    let trimmed = token.trim();
    if let Ok(value) = trimmed.parse::<u32>() {
        return Ok(value);
    }
    trimmed
        .parse::<i32>()
        .map(|value| value as u32)
        .map_err(|_| invalid(token))
}

/// The high half has no signed interpretation; a negative value is rejected.
fn parse_high(token: &str) -> Result<u32> {
    token.trim().parse::<u32>().map_err(|_| invalid(token))
}

fn invalid(token: &str) -> FrameError {
    FrameError::InvalidInteger {
        token: token.to_string(),
    }
}
