use clap::ValueEnum;
use mythlink_frame::WIRE_TARGET;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Wire traffic is only logged when `wire` is set; otherwise its target is
/// capped at `info`.
pub fn filter(level: LogLevel, wire: bool) -> Targets {
    let level = level.as_filter();
    let wire_level = if wire { level } else { level.min(LevelFilter::INFO) };
    Targets::new()
        .with_default(level)
        .with_target(WIRE_TARGET, wire_level)
}

pub fn init_logging(format: LogFormat, level: LogLevel, wire: bool) {
    let targets = filter(level, wire);
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(wire);

    let registry = tracing_subscriber::registry();
    let _ = match format {
        LogFormat::Text => registry.with(layer.with_filter(targets)).try_init(),
        LogFormat::Json => registry.with(layer.json().with_filter(targets)).try_init(),
    };
}
