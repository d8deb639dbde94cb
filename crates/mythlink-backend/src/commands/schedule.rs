use tracing::debug;

use super::{number, program_records, record_count};
use crate::connection::Connection;
use crate::domain::{ProgramRecord, Schedule, UpcomingFilter};
use crate::error::{BackendError, Result};

impl Connection {
    /// Pending recordings whose status passes `filter`.
    pub fn upcoming_recordings(&mut self, filter: &UpcomingFilter) -> Result<Vec<ProgramRecord>> {
        const COMMAND: &str = "QUERY_GETALLPENDING";
        let record_size = self.protocol().record_size();
        let reply = self.request(&[COMMAND, "2"])?;
        let has_conflicts: i32 = number(&reply, 0, COMMAND)?;
        let count = record_count(&reply, 1, COMMAND)?;
        debug!(count, has_conflicts, "pending recordings");

        let mut programs = program_records(&reply[2..], count, record_size, COMMAND)?;
        programs.retain(|p| p.recording_status().is_some_and(|s| filter.contains(s)));
        Ok(programs)
    }

    /// Every schedule rule as a program record, ordered by title.
    pub fn scheduled_recordings(&mut self) -> Result<Vec<ProgramRecord>> {
        const COMMAND: &str = "QUERY_GETALLSCHEDULED";
        let record_size = self.protocol().record_size();
        let reply = self.request(&[COMMAND])?;
        let count = record_count(&reply, 0, COMMAND)?;
        program_records(&reply[1..], count, record_size, COMMAND)
    }

    /// Ask the backend to reschedule. `None` reschedules everything.
    pub fn reschedule(&mut self, schedule: Option<&Schedule>) -> Result<()> {
        let id = schedule.and_then(|s| s.id).unwrap_or(0);
        let command = format!("RESCHEDULE_RECORDINGS {id}");
        let reply = self.request(&[command.as_str()])?;
        let rc: i64 = number(&reply, 0, "RESCHEDULE_RECORDINGS")?;
        if rc < 0 {
            return Err(BackendError::Server(format!(
                "reschedule notify failed: {reply}"
            )));
        }
        Ok(())
    }

    /// Insert or update `schedule` in the catalog, then reschedule it.
    pub fn save_schedule(&mut self, schedule: &mut Schedule) -> Result<()> {
        self.db()?.save_schedule(schedule)?;
        self.reschedule(Some(schedule))
    }

    /// Remove `schedule` from the catalog, then reschedule everything.
    pub fn delete_schedule(&mut self, schedule: &Schedule) -> Result<()> {
        self.db()?.delete_schedule(schedule)?;
        self.reschedule(None)
    }
}
