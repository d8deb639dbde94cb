//! The command invoker: one method on [`Connection`](crate::Connection) per
//! backend operation.

mod recorder;
mod recordings;
mod schedule;
mod status;

pub use recordings::{ALL_GROUPS, ALL_SHOWS};

use std::str::FromStr;

use mythlink_frame::Message;

use crate::domain::ProgramRecord;
use crate::error::{BackendError, Result};

/// Token `index` of `reply`, or an unexpected-reply error naming `command`.
pub(crate) fn token<'a>(reply: &'a Message, index: usize, command: &str) -> Result<&'a str> {
    reply.token(index).ok_or_else(|| {
        BackendError::UnexpectedReply(format!("{command}: missing field {index} in {reply}"))
    })
}

/// Token `index` of `reply` parsed as a number.
pub(crate) fn number<T: FromStr>(reply: &Message, index: usize, command: &str) -> Result<T> {
    let raw = token(reply, index, command)?;
    raw.trim().parse().map_err(|_| {
        BackendError::UnexpectedReply(format!("{command}: field {index} is not a number: {raw:?}"))
    })
}

/// Slice `count` fixed-width program records out of `tokens`.
pub(crate) fn program_records(
    tokens: &[String],
    count: usize,
    record_size: usize,
    command: &str,
) -> Result<Vec<ProgramRecord>> {
    let needed = count.saturating_mul(record_size);
    if tokens.len() < needed {
        return Err(BackendError::UnexpectedReply(format!(
            "{command}: {count} records of {record_size} fields need {needed} tokens, got {}",
            tokens.len()
        )));
    }
    tokens[..needed]
        .chunks(record_size)
        .map(|record| ProgramRecord::new(record.to_vec()))
        .collect()
}

/// Parse a record count, treating anything negative as an error.
pub(crate) fn record_count(reply: &Message, index: usize, command: &str) -> Result<usize> {
    let count: i64 = number(reply, index, command)?;
    usize::try_from(count).map_err(|_| {
        BackendError::UnexpectedReply(format!("{command}: negative record count {count}"))
    })
}

fn recorder(tuner_id: u32) -> String {
    format!("QUERY_RECORDER {tuner_id}")
}

fn remote_encoder(tuner_id: u32) -> String {
    format!("QUERY_REMOTEENCODER {tuner_id}")
}
