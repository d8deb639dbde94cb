use std::cmp::Reverse;

use mythlink_frame::{longlong, Message};
use tracing::{debug, info};

use super::{number, program_records, record_count, token};
use crate::connection::Connection;
use crate::domain::{CommercialBreak, Job, ProgramRecord, LIVE_TV_GROUP};
use crate::error::{BackendError, Result};
use crate::events::Event;

/// Recording-group wildcard accepted by [`Connection::recordings`].
pub const ALL_GROUPS: &str = "All Groups";
/// Title wildcard accepted by [`Connection::recordings`].
pub const ALL_SHOWS: &str = "All Shows";

const COMMBREAK: &str = "QUERY_COMMBREAK";
const COMM_START: i32 = 4;
const COMM_END: i32 = 5;
/// Tokens per comm-break marker: type, high word, low word.
const COMM_MARK_FIELDS: usize = 3;

impl Connection {
    /// Every recording outside the LiveTV group, most recent first.
    pub fn all_recordings(&mut self) -> Result<Vec<ProgramRecord>> {
        let mut programs = self.query_recordings()?;
        programs.retain(|p| p.recording_group() != LIVE_TV_GROUP);
        programs.sort_by_key(|p| Reverse(p.start_timestamp()));
        Ok(programs)
    }

    /// Recordings in `group` titled `title`, compared case-insensitively.
    ///
    /// [`ALL_GROUPS`] and [`ALL_SHOWS`] match anything.
    pub fn recordings(&mut self, group: &str, title: &str) -> Result<Vec<ProgramRecord>> {
        let fits = |wanted: &str, wildcard: &str, actual: &str| {
            wanted.eq_ignore_ascii_case(wildcard) || wanted.eq_ignore_ascii_case(actual)
        };
        let mut programs = self.query_recordings()?;
        programs.retain(|p| {
            fits(group, ALL_GROUPS, p.recording_group()) && fits(title, ALL_SHOWS, p.title())
        });
        Ok(programs)
    }

    fn query_recordings(&mut self) -> Result<Vec<ProgramRecord>> {
        const COMMAND: &str = "QUERY_RECORDINGS Play";
        let record_size = self.protocol().record_size();
        let reply = self.request(&[COMMAND])?;
        let count = record_count(&reply, 0, COMMAND)?;
        program_records(&reply[1..], count, record_size, COMMAND)
    }

    /// The recording on `channel_id` starting at `start`, if the backend has one.
    pub fn recording(&mut self, channel_id: &str, start: &str) -> Result<Option<ProgramRecord>> {
        let reply = self.request(&[format!("QUERY_RECORDING TIMESLOT {channel_id} {start}")])?;
        if !reply.is_ok() {
            debug!(channel_id, start, "recording not found");
            return Ok(None);
        }
        ProgramRecord::new(reply.into_tokens().split_off(1)).map(Some)
    }

    /// Bookmarked frame for `program`; 0 when none is set.
    pub fn bookmark(&mut self, program: &ProgramRecord) -> Result<u64> {
        let reply = self.request(&[format!(
            "QUERY_BOOKMARK {} {}",
            program.channel_id(),
            program.start_ts()
        )])?;
        let frame = longlong::parse(
            token(&reply, 1, "QUERY_BOOKMARK")?,
            token(&reply, 0, "QUERY_BOOKMARK")?,
        )?;
        debug!(program = %program, frame, "bookmark");
        Ok(frame)
    }

    pub fn set_bookmark(&mut self, program: &ProgramRecord, frame: u64) -> Result<()> {
        let (low, high) = longlong::encode(frame);
        let reply = self.request(&[format!(
            "SET_BOOKMARK {} {} {high} {low}",
            program.channel_id(),
            program.start_ts()
        )])?;
        match token(&reply, 0, "SET_BOOKMARK")? {
            "OK" => {
                debug!(program = %program, frame, "bookmark set");
                Ok(())
            }
            "FAILED" => Err(BackendError::Server(format!(
                "failed to save position in program '{}' to frame {frame}",
                program.title()
            ))),
            other => Err(BackendError::UnexpectedReply(format!(
                "SET_BOOKMARK: {other}"
            ))),
        }
    }

    /// Commercial breaks in `program`, in chronological order.
    pub fn commercial_breaks(&mut self, program: &ProgramRecord) -> Result<Vec<CommercialBreak>> {
        let reply = self.request(&[format!(
            "QUERY_COMMBREAK {} {}",
            program.channel_id(),
            program.start_ts()
        )])?;
        let breaks = decode_commercial_breaks(&reply, program.frame_rate())?;
        debug!(program = %program, count = breaks.len(), "commercial breaks");
        Ok(breaks)
    }

    /// Delete `program`; publishes [`Event::RecordingDeleted`] once the backend
    /// accepts. Returns the backend's result code.
    pub fn delete_recording(&mut self, program: &ProgramRecord) -> Result<i32> {
        let rc = self.program_command("DELETE_RECORDING", program)?;
        self.bus().publish(&Event::RecordingDeleted {
            program: program.clone(),
        });
        info!(program = %program, rc, "deleted recording");
        Ok(rc)
    }

    /// Let the scheduler record `program` again.
    pub fn forget_recording(&mut self, program: &ProgramRecord) -> Result<i32> {
        let rc = self.program_command("FORGET_RECORDING", program)?;
        debug!(program = %program, rc, "forgot recording");
        Ok(rc)
    }

    /// Delete `program` and allow it to be recorded again.
    /// Returns the delete result code.
    pub fn rerecord_recording(&mut self, program: &ProgramRecord) -> Result<i32> {
        let rc = self.delete_recording(program)?;
        self.forget_recording(program)?;
        Ok(rc)
    }

    /// Catalog jobs attached to `program`.
    pub fn jobs(&self, program: &ProgramRecord) -> Result<Vec<Job>> {
        self.db()?.jobs(program)
    }

    /// `<command> <program tokens...> 0`; the reply must be an integer.
    fn program_command(&mut self, command: &str, program: &ProgramRecord) -> Result<i32> {
        let mut tokens = Vec::with_capacity(program.tokens().len() + 2);
        tokens.push(command.to_string());
        tokens.extend(program.tokens().iter().cloned());
        tokens.push("0".to_string());

        let reply = self.request(tokens.as_slice())?;
        let first = token(&reply, 0, command)?;
        first
            .parse()
            .map_err(|_| BackendError::Server(format!("{command}: {first}")))
    }
}

/// Decode a `QUERY_COMMBREAK` reply.
///
/// `reply[0]` is the marker count (`-1` for no data); each marker is
/// `type, high, low` and markers alternate start/end.
pub(crate) fn decode_commercial_breaks(reply: &Message, fps: f64) -> Result<Vec<CommercialBreak>> {
    let count: i64 = number(reply, 0, COMMBREAK)?;
    if count == -1 {
        return Ok(Vec::new());
    }
    if count < 0 || count % 2 != 0 {
        return Err(BackendError::Client(format!(
            "expected an even number of comm break records but got {count}"
        )));
    }

    let markers = usize::try_from(count).ok();
    let expected = markers
        .and_then(|n| n.checked_mul(COMM_MARK_FIELDS))
        .and_then(|n| n.checked_add(1));
    let (Some(markers), Some(expected)) = (markers, expected) else {
        return Err(BackendError::UnexpectedReply(format!(
            "{COMMBREAK}: marker count {count} is out of range"
        )));
    };
    if reply.tokens().len() != expected {
        return Err(BackendError::UnexpectedReply(format!(
            "{COMMBREAK}: {count} markers need {expected} fields but got {}",
            reply.tokens().len()
        )));
    }

    let mut breaks = Vec::with_capacity(markers / 2);
    for pair in 0..markers / 2 {
        let base = 1 + pair * 2 * COMM_MARK_FIELDS;
        let start = marker(reply, base, COMM_START, pair * 2 + 1)?;
        let end = marker(reply, base + COMM_MARK_FIELDS, COMM_END, pair * 2 + 2)?;
        breaks.push(CommercialBreak::from_frames(start, end, fps));
    }
    Ok(breaks)
}

fn marker(reply: &Message, base: usize, expected: i32, record: usize) -> Result<u64> {
    let kind: i32 = number(reply, base, COMMBREAK)?;
    if kind != expected {
        let name = if expected == COMM_START { "COMM_START" } else { "COMM_END" };
        return Err(BackendError::UnexpectedReply(format!(
            "expected {name} for record {record} but got {kind}"
        )));
    }
    Ok(longlong::parse(
        token(reply, base + 2, COMMBREAK)?,
        token(reply, base + 1, COMMBREAK)?,
    )?)
}
