use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use mythlink_backend::{
    BackendConfig, Connection, ListenerBus, Negotiator, DEFAULT_CLIENT_VERSION, DEFAULT_PORT,
};

use crate::exit::{backend_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod commbreaks;
pub mod fetch;
pub mod probe;
pub mod recordings;
pub mod status;
pub mod upcoming;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show version information.
    Version(VersionArgs),
    /// Negotiate with a backend and print its protocol details.
    Probe(ProbeArgs),
    /// Show backend disk usage, load and tuner availability.
    Status(StatusArgs),
    /// List recordings.
    Recordings(RecordingsArgs),
    /// List upcoming scheduled recordings.
    Upcoming(UpcomingArgs),
    /// Print the commercial breaks flagged in a recording.
    Commbreaks(CommbreaksArgs),
    /// Copy a recording file from the backend.
    Fetch(FetchArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Version(args) => version::run(args),
        Command::Probe(args) => probe::run(args, format),
        Command::Status(args) => status::run(args, format),
        Command::Recordings(args) => recordings::run(args, format),
        Command::Upcoming(args) => upcoming::run(args, format),
        Command::Commbreaks(args) => commbreaks::run(args, format),
        Command::Fetch(args) => fetch::run(args, format),
    }
}

/// Where the master backend is and how to talk to it.
#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Master backend host.
    #[arg(long, env = "MYTHLINK_HOST", default_value = "localhost")]
    pub host: String,
    /// Master backend port.
    #[arg(long, env = "MYTHLINK_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Protocol version offered to the backend.
    #[arg(long, env = "MYTHLINK_CLIENT_VERSION", default_value_t = DEFAULT_CLIENT_VERSION)]
    pub client_version: u32,
    /// Name to announce as. Default: the local host name.
    #[arg(long, env = "MYTHLINK_CLIENT_HOSTNAME")]
    pub client_hostname: Option<String>,
    /// Connect, read and write deadline (e.g. 30s, 500ms).
    #[arg(long, env = "MYTHLINK_TIMEOUT", default_value = "30s")]
    pub timeout: String,
}

impl BackendArgs {
    pub fn config(&self) -> CliResult<BackendConfig> {
        let mut config = BackendConfig::new(self.host.clone(), self.port)
            .with_timeout(parse_timeout(&self.timeout)?);
        config.client_version = self.client_version;
        if let Some(name) = &self.client_hostname {
            config.client_hostname = name.clone();
        }
        Ok(config)
    }

    /// Open a playback connection to the master backend.
    pub fn open(&self) -> CliResult<Connection> {
        let config = self.config()?;
        let negotiator = Negotiator::standard(config.client_version);
        Connection::open(config, negotiator, Arc::new(ListenerBus::new()))
            .map_err(|err| backend_error("connect failed", err))
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Args, Debug)]
pub struct RecordingsArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
    /// Only recordings in this recording group.
    #[arg(long)]
    pub group: Option<String>,
    /// Only recordings with this title.
    #[arg(long)]
    pub title: Option<String>,
    /// Include the LiveTV group.
    #[arg(long, conflicts_with_all = ["group", "title"])]
    pub live_tv: bool,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum UpcomingKind {
    #[default]
    Scheduled,
    Conflicts,
    Duplicates,
    All,
}

#[derive(Args, Debug)]
pub struct UpcomingArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
    /// Which upcoming recordings to list.
    #[arg(long, value_enum, default_value_t = UpcomingKind::Scheduled)]
    pub show: UpcomingKind,
}

#[derive(Args, Debug)]
pub struct CommbreaksArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
    /// Channel id of the recording.
    pub channel_id: String,
    /// Recording start time as the backend formats it (e.g. 2010-03-01T20:00:00).
    pub start: String,
    /// Frame rate used to convert frame numbers to seconds.
    #[arg(long)]
    pub fps: Option<f64>,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
    /// Remote file path as the backend names it (e.g. /1001_20100301200000.mpg).
    pub path: String,
    /// Local destination file.
    pub dest: PathBuf,
    /// Backend that holds the file. Default: the master.
    #[arg(long)]
    pub backend_host: Option<String>,
}

pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
