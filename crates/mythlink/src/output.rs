use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mythlink_backend::ProgramSummary;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Key/value pairs as a two-column table or aligned lines.
pub fn print_fields(title: &str, fields: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![title.to_uppercase(), String::new()]);
            for (key, value) in fields {
                table.add_row(vec![key.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Json => {
            println!("{title}:");
            let width = fields.iter().map(|(key, _)| key.len()).max().unwrap_or(0) + 1;
            for (key, value) in fields {
                println!("  {:<width$} {value}", format!("{key}:"));
            }
        }
    }
}

pub fn print_programs(programs: &[ProgramSummary], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&programs),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["START", "CHANNEL", "TITLE", "SUBTITLE", "GROUP", "SIZE"]);
            for program in programs {
                table.add_row(vec![
                    program.start.clone().unwrap_or_default(),
                    program.channel.clone(),
                    program.title.clone(),
                    program.subtitle.clone(),
                    program.recording_group.clone(),
                    program.file_size.map(human_bytes).unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for program in programs {
                let start = program.start.as_deref().unwrap_or("?");
                if program.subtitle.is_empty() {
                    println!("{start}  {}  {}", program.channel, program.title);
                } else {
                    println!(
                        "{start}  {}  {}: {}",
                        program.channel, program.title, program.subtitle
                    );
                }
            }
        }
    }
}

pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// `H:MM:SS` for a position in seconds.
pub fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
