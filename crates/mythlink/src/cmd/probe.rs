use serde::Serialize;
use tracing::info;

use crate::cmd::ProbeArgs;
use crate::exit::{backend_error, CliResult, SUCCESS};
use crate::output::{print_fields, print_json, OutputFormat};

#[derive(Serialize)]
struct ProbeOutput {
    host: String,
    port: u16,
    client_hostname: String,
    client_version: u32,
    protocol_version: u32,
    myth_version: String,
    record_size: usize,
    connected: bool,
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = args.backend.open()?;
    let protocol = conn.protocol();
    let out = ProbeOutput {
        host: conn.host().to_string(),
        port: conn.port(),
        client_hostname: conn.config().client_hostname.clone(),
        client_version: conn.config().client_version,
        protocol_version: protocol.version(),
        myth_version: protocol.myth_version().to_string(),
        record_size: protocol.record_size(),
        connected: true,
    };
    info!(host = %out.host, version = out.protocol_version, "backend reachable");
    conn.close().map_err(|err| backend_error("close failed", err))?;

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => print_fields(
            "Backend",
            &[
                ("Address", format!("{}:{}", out.host, out.port)),
                ("Announced as", out.client_hostname.clone()),
                ("Protocol", out.protocol_version.to_string()),
                ("MythTV", out.myth_version.clone()),
                ("Record size", out.record_size.to_string()),
            ],
            format,
        ),
    }
    Ok(SUCCESS)
}
