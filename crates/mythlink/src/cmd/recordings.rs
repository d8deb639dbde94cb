use mythlink_backend::{Connection, ProgramRecord, ProgramSummary, ALL_GROUPS, ALL_SHOWS};

use crate::cmd::RecordingsArgs;
use crate::exit::{backend_error, CliResult, SUCCESS};
use crate::output::{print_programs, OutputFormat};

pub fn run(args: RecordingsArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = args.backend.open()?;
    let found = query(&mut conn, &args);
    let closed = conn.close();
    let programs = found.map_err(|err| backend_error("recordings failed", err))?;
    closed.map_err(|err| backend_error("close failed", err))?;

    let summaries: Vec<ProgramSummary> = programs.iter().map(ProgramRecord::summary).collect();
    print_programs(&summaries, format);
    Ok(SUCCESS)
}

fn query(conn: &mut Connection, args: &RecordingsArgs) -> mythlink_backend::Result<Vec<ProgramRecord>> {
    if args.live_tv {
        return conn.recordings(ALL_GROUPS, ALL_SHOWS);
    }
    match (&args.group, &args.title) {
        (None, None) => conn.all_recordings(),
        (group, title) => conn.recordings(
            group.as_deref().unwrap_or(ALL_GROUPS),
            title.as_deref().unwrap_or(ALL_SHOWS),
        ),
    }
}
