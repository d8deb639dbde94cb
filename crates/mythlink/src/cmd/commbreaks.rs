use mythlink_backend::{BackendError, CommercialBreak, Connection};
use serde::Serialize;

use crate::cmd::CommbreaksArgs;
use crate::exit::{backend_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{clock, print_json, OutputFormat};

#[derive(Serialize)]
struct BreaksOutput {
    title: String,
    fps: f64,
    breaks: Vec<CommercialBreak>,
}

pub fn run(args: CommbreaksArgs, format: OutputFormat) -> CliResult<i32> {
    if let Some(fps) = args.fps {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(CliError::new(USAGE, format!("invalid frame rate: {fps}")));
        }
    }

    let mut conn = args.backend.open()?;
    let found = lookup(&mut conn, &args);
    let closed = conn.close();
    let out = found.map_err(|err| backend_error("commbreaks failed", err))?;
    closed.map_err(|err| backend_error("close failed", err))?;

    let Some(out) = out else {
        return Err(CliError::new(
            FAILURE,
            format!("no recording on channel {} at {}", args.channel_id, args.start),
        ));
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("{} ({} fps)", out.title, out.fps);
            if out.breaks.is_empty() {
                println!("  no commercial breaks flagged");
            }
            for (i, b) in out.breaks.iter().enumerate() {
                println!(
                    "  {:>2}. {} - {}  ({:.0}s)",
                    i + 1,
                    clock(b.start),
                    clock(b.end),
                    b.duration()
                );
            }
        }
    }
    Ok(SUCCESS)
}

fn lookup(conn: &mut Connection, args: &CommbreaksArgs) -> Result<Option<BreaksOutput>, BackendError> {
    let Some(mut program) = conn.recording(&args.channel_id, &args.start)? else {
        return Ok(None);
    };
    if let Some(fps) = args.fps {
        program = program.with_frame_rate(fps);
    }
    let breaks = conn.commercial_breaks(&program)?;
    Ok(Some(BreaksOutput {
        title: program.title().to_string(),
        fps: program.frame_rate(),
        breaks,
    }))
}
