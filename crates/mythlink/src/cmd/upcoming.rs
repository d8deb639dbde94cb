use mythlink_backend::{ProgramRecord, ProgramSummary, UpcomingFilter};

use crate::cmd::{UpcomingArgs, UpcomingKind};
use crate::exit::{backend_error, CliResult, SUCCESS};
use crate::output::{print_programs, OutputFormat};

impl UpcomingKind {
    fn filter(self) -> UpcomingFilter {
        match self {
            UpcomingKind::Scheduled => UpcomingFilter::scheduled(),
            UpcomingKind::Conflicts => UpcomingFilter::conflicts(),
            UpcomingKind::Duplicates => UpcomingFilter::duplicates(),
            UpcomingKind::All => UpcomingFilter::all(),
        }
    }
}

pub fn run(args: UpcomingArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = args.backend.open()?;
    let found = conn.upcoming_recordings(&args.show.filter());
    let closed = conn.close();
    let programs = found.map_err(|err| backend_error("upcoming failed", err))?;
    closed.map_err(|err| backend_error("close failed", err))?;

    let summaries: Vec<ProgramSummary> = programs.iter().map(ProgramRecord::summary).collect();
    print_programs(&summaries, format);
    Ok(SUCCESS)
}
