use mythlink_backend::{Connection, DiskUsage, Load};
use serde::Serialize;

use crate::cmd::StatusArgs;
use crate::exit::{backend_error, CliResult, SUCCESS};
use crate::output::{human_bytes, print_fields, print_json, OutputFormat};

#[derive(Serialize)]
struct StatusOutput {
    protocol_version: u32,
    disk: DiskUsage,
    load: Load,
    uptime_secs: Option<u64>,
    free_tuners: u32,
}

pub fn run(args: StatusArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = args.backend.open()?;
    let status = collect(&mut conn);
    let closed = conn.close();
    let out = status.map_err(|err| backend_error("status failed", err))?;
    closed.map_err(|err| backend_error("close failed", err))?;

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            let uptime = match out.uptime_secs {
                Some(secs) => format!("{}d {}h {}m", secs / 86_400, (secs / 3600) % 24, (secs / 60) % 60),
                None => "unavailable".to_string(),
            };
            print_fields(
                "Status",
                &[
                    ("Protocol", out.protocol_version.to_string()),
                    ("Storage", format!("{}:{}", out.disk.hostname, out.disk.dir)),
                    ("Total", human_bytes(out.disk.total)),
                    ("Used", human_bytes(out.disk.used)),
                    ("Free", human_bytes(out.disk.free)),
                    (
                        "Load",
                        format!("{} {} {}", out.load.one, out.load.five, out.load.fifteen),
                    ),
                    ("Uptime", uptime),
                    ("Free tuners", out.free_tuners.to_string()),
                ],
                format,
            );
        }
    }
    Ok(SUCCESS)
}

fn collect(conn: &mut Connection) -> mythlink_backend::Result<StatusOutput> {
    Ok(StatusOutput {
        protocol_version: conn.protocol_version(),
        disk: conn.disk_usage()?,
        load: conn.load()?,
        uptime_secs: conn.uptime()?.map(|d| d.as_secs()),
        free_tuners: conn.free_tuner_count()?,
    })
}
