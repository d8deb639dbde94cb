//! Values exchanged with the backend.

use std::fmt;

use chrono::{DateTime, Local, TimeZone, Utc};
use mythlink_frame::longlong;
use serde::Serialize;

use crate::error::{BackendError, Result};

/// Frame rate assumed for a program when none is known.
pub const DEFAULT_FRAME_RATE: f64 = 29.97;

/// Recording group that holds live-TV buffers.
pub const LIVE_TV_GROUP: &str = "LiveTV";

/// Identifies one live-viewing session: `live-<host>-<local timestamp>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChainId(String);

impl ChainId {
    /// Build a chain id for `hostname` stamped with the current local time.
    pub fn generate(hostname: &str) -> Self {
        Self::at(hostname, Local::now())
    }

    /// Build a chain id for `hostname` stamped with `when`.
    pub fn at<Tz: TimeZone>(hostname: &str, when: DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(format!(
            "live-{hostname}-{}",
            when.format("%Y-%m-%dT%H:%M:%S")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convert a frame offset into seconds at `fps`.
pub fn frames_to_seconds(frames: u64, fps: f64) -> f64 {
    frames as f64 / fps
}

/// A commercial break, in seconds from the start of the recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CommercialBreak {
    pub start: f64,
    pub end: f64,
}

impl CommercialBreak {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Build a break from frame offsets.
    pub fn from_frames(start_frame: u64, end_frame: u64, fps: f64) -> Self {
        Self::new(
            frames_to_seconds(start_frame, fps),
            frames_to_seconds(end_frame, fps),
        )
    }

    /// True when `seconds` falls inside the break.
    pub fn contains(&self, seconds: f64) -> bool {
        self.start <= seconds && seconds <= self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A tuner (capture card) and the backend host it lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tuner {
    pub id: u32,
    pub hostname: String,
}

impl Tuner {
    pub fn new(id: u32, hostname: impl Into<String>) -> Self {
        Self {
            id,
            hostname: hostname.into(),
        }
    }
}

/// What a remote encoder is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TunerState {
    Error = -1,
    Ok = 0,
    WatchingLiveTv = 1,
    WatchingPreRecorded = 2,
    WatchingVideo = 3,
    WatchingDvd = 4,
    WatchingRecording = 5,
    RecordingOnly = 6,
    ChangingState = 7,
}

impl TunerState {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -1 => Self::Error,
            0 => Self::Ok,
            1 => Self::WatchingLiveTv,
            2 => Self::WatchingPreRecorded,
            3 => Self::WatchingVideo,
            4 => Self::WatchingDvd,
            5 => Self::WatchingRecording,
            6 => Self::RecordingOnly,
            7 => Self::ChangingState,
            _ => return None,
        })
    }

    /// States in which the encoder has a current program.
    pub fn has_program(self) -> bool {
        matches!(
            self,
            Self::WatchingLiveTv
                | Self::RecordingOnly
                | Self::WatchingPreRecorded
                | Self::WatchingRecording
        )
    }
}

/// A tuner the backend reports as free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeTuner {
    pub id: u32,
    pub host: String,
    pub port: u16,
}

/// Storage statistics for the master backend, in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub hostname: String,
    pub dir: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Backend load averages for the last 1, 5 and 15 minutes, as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Load {
    pub one: String,
    pub five: String,
    pub fifteen: String,
}

/// A channel as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: u32,
    pub number: String,
    pub callsign: String,
    pub name: String,
}

/// A recording schedule as stored in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// `None` until the catalog assigns one.
    pub id: Option<u32>,
    pub title: String,
    pub channel_id: Option<u32>,
}

/// A catalog job (commercial flagging, transcoding) attached to a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: u32,
    pub kind: String,
    pub status: String,
}

/// Recording status codes carried in program records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordingStatus {
    Deleted = -5,
    Stopped = -4,
    Recorded = -3,
    Recording = -2,
    WillRecord = -1,
    Unknown = 0,
    DontRecord = 1,
    PreviousRecording = 2,
    CurrentRecording = 3,
    EarlierShowing = 4,
    TooManyRecordings = 5,
    NotListed = 6,
    Conflict = 7,
    LaterShowing = 8,
    Repeat = 9,
    Inactive = 10,
    NeverRecord = 11,
    Offline = 12,
    OtherShowing = 13,
}

impl RecordingStatus {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -5 => Self::Deleted,
            -4 => Self::Stopped,
            -3 => Self::Recorded,
            -2 => Self::Recording,
            -1 => Self::WillRecord,
            0 => Self::Unknown,
            1 => Self::DontRecord,
            2 => Self::PreviousRecording,
            3 => Self::CurrentRecording,
            4 => Self::EarlierShowing,
            5 => Self::TooManyRecordings,
            6 => Self::NotListed,
            7 => Self::Conflict,
            8 => Self::LaterShowing,
            9 => Self::Repeat,
            10 => Self::Inactive,
            11 => Self::NeverRecord,
            12 => Self::Offline,
            13 => Self::OtherShowing,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Which upcoming recordings to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingFilter {
    statuses: Vec<RecordingStatus>,
}

impl UpcomingFilter {
    pub fn new(statuses: impl IntoIterator<Item = RecordingStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }

    /// Shows the backend will record.
    pub fn scheduled() -> Self {
        Self::new([RecordingStatus::WillRecord])
    }

    /// Shows that lost a tuner conflict.
    pub fn conflicts() -> Self {
        Self::new([RecordingStatus::Conflict])
    }

    /// Shows skipped as duplicates.
    pub fn duplicates() -> Self {
        Self::new([
            RecordingStatus::NeverRecord,
            RecordingStatus::PreviousRecording,
            RecordingStatus::CurrentRecording,
        ])
    }

    /// Every pending entry regardless of status.
    pub fn all() -> Self {
        Self::new([
            RecordingStatus::Deleted,
            RecordingStatus::Stopped,
            RecordingStatus::Recorded,
            RecordingStatus::Recording,
            RecordingStatus::WillRecord,
            RecordingStatus::Unknown,
            RecordingStatus::DontRecord,
            RecordingStatus::PreviousRecording,
            RecordingStatus::CurrentRecording,
            RecordingStatus::EarlierShowing,
            RecordingStatus::TooManyRecordings,
            RecordingStatus::NotListed,
            RecordingStatus::Conflict,
            RecordingStatus::LaterShowing,
            RecordingStatus::Repeat,
            RecordingStatus::Inactive,
            RecordingStatus::NeverRecord,
            RecordingStatus::Offline,
            RecordingStatus::OtherShowing,
        ])
    }

    pub fn contains(&self, status: RecordingStatus) -> bool {
        self.statuses.contains(&status)
    }
}

impl Default for UpcomingFilter {
    fn default() -> Self {
        Self::scheduled()
    }
}

mod field {
    pub const TITLE: usize = 0;
    pub const SUBTITLE: usize = 1;
    pub const DESCRIPTION: usize = 2;
    pub const CATEGORY: usize = 3;
    pub const CHANNEL_ID: usize = 4;
    pub const CHANNEL_NUMBER: usize = 5;
    pub const CALLSIGN: usize = 6;
    pub const CHANNEL_NAME: usize = 7;
    pub const FILENAME: usize = 8;
    pub const FILESIZE_HIGH: usize = 9;
    pub const FILESIZE_LOW: usize = 10;
    pub const START_TIME: usize = 11;
    pub const END_TIME: usize = 12;
    pub const HOSTNAME: usize = 16;
    pub const REC_STATUS: usize = 21;
    pub const REC_START_TIME: usize = 26;
    pub const REC_GROUP: usize = 30;
}

/// Smallest token count that covers every field this client reads.
pub const MIN_PROGRAM_FIELDS: usize = field::REC_GROUP + 1;

/// One program record as the backend sends it.
///
/// The raw tokens are kept verbatim so the record can be echoed back in
/// commands such as `DELETE_RECORDING`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramRecord {
    tokens: Vec<String>,
    frame_rate: Option<f64>,
}

impl ProgramRecord {
    pub fn new(tokens: Vec<String>) -> Result<Self> {
        if tokens.len() < MIN_PROGRAM_FIELDS {
            return Err(BackendError::UnexpectedReply(format!(
                "program record has {} fields, expected at least {MIN_PROGRAM_FIELDS}",
                tokens.len()
            )));
        }
        Ok(Self {
            tokens,
            frame_rate: None,
        })
    }

    /// Attach the frame rate used to turn frame offsets into seconds.
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    fn field(&self, index: usize) -> &str {
        self.tokens.get(index).map(String::as_str).unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.field(field::TITLE)
    }

    pub fn subtitle(&self) -> &str {
        self.field(field::SUBTITLE)
    }

    pub fn description(&self) -> &str {
        self.field(field::DESCRIPTION)
    }

    pub fn category(&self) -> &str {
        self.field(field::CATEGORY)
    }

    pub fn channel_id(&self) -> &str {
        self.field(field::CHANNEL_ID)
    }

    pub fn channel_number(&self) -> &str {
        self.field(field::CHANNEL_NUMBER)
    }

    pub fn callsign(&self) -> &str {
        self.field(field::CALLSIGN)
    }

    pub fn channel_name(&self) -> &str {
        self.field(field::CHANNEL_NAME)
    }

    /// Backend URL of the recording, e.g. `myth://host:6543/1001_2009.mpg`.
    pub fn filename(&self) -> &str {
        self.field(field::FILENAME)
    }

    pub fn file_size(&self) -> Result<u64> {
        Ok(longlong::parse(
            self.field(field::FILESIZE_LOW),
            self.field(field::FILESIZE_HIGH),
        )?)
    }

    /// Start time token exactly as the backend sent it.
    pub fn start_ts(&self) -> &str {
        self.field(field::START_TIME)
    }

    /// Start time in seconds since the epoch; 0 when unparseable.
    pub fn start_timestamp(&self) -> i64 {
        self.start_ts().parse().unwrap_or_default()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.start_ts().parse().ok()?, 0)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.field(field::END_TIME).parse().ok()?, 0)
    }

    pub fn recording_start_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.field(field::REC_START_TIME).parse().ok()?, 0)
    }

    /// Backend host that recorded the program.
    pub fn hostname(&self) -> &str {
        self.field(field::HOSTNAME)
    }

    pub fn recording_status(&self) -> Option<RecordingStatus> {
        RecordingStatus::from_code(self.field(field::REC_STATUS).parse().ok()?)
    }

    pub fn recording_group(&self) -> &str {
        self.field(field::REC_GROUP)
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate.unwrap_or(DEFAULT_FRAME_RATE)
    }

    /// Path part of the backend URL, without the `myth://host:port` prefix.
    pub fn bare_filename(&self) -> &str {
        let name = self.filename();
        match name.strip_prefix("myth://") {
            Some(rest) => rest.find('/').map_or(rest, |slash| &rest[slash..]),
            None => name,
        }
    }

    pub fn summary(&self) -> ProgramSummary {
        ProgramSummary {
            title: self.title().to_string(),
            subtitle: self.subtitle().to_string(),
            channel: self.channel_number().to_string(),
            callsign: self.callsign().to_string(),
            start: self.start_time().map(|t| t.to_rfc3339()),
            end: self.end_time().map(|t| t.to_rfc3339()),
            hostname: self.hostname().to_string(),
            filename: self.filename().to_string(),
            file_size: self.file_size().ok(),
            status: self.recording_status(),
            recording_group: self.recording_group().to_string(),
        }
    }
}

impl fmt::Display for ProgramRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subtitle().is_empty() {
            write!(f, "{}", self.title())
        } else {
            write!(f, "{} - {}", self.title(), self.subtitle())
        }
    }
}

/// Serializable view of the interesting [`ProgramRecord`] fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramSummary {
    pub title: String,
    pub subtitle: String,
    pub channel: String,
    pub callsign: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub hostname: String,
    pub filename: String,
    pub file_size: Option<u64>,
    pub status: Option<RecordingStatus>,
    pub recording_group: String,
}
