use std::time::Duration;

use mythlink_frame::longlong;

use super::token;
use crate::connection::Connection;
use crate::domain::{DiskUsage, Load};
use crate::error::Result;

impl Connection {
    /// Storage usage of the master backend's first storage group.
    pub fn disk_usage(&mut self) -> Result<DiskUsage> {
        const COMMAND: &str = "QUERY_FREE_SPACE";
        let reply = self.request(&[COMMAND])?;
        let total = longlong::parse(token(&reply, 6, COMMAND)?, token(&reply, 5, COMMAND)?)?;
        let used = longlong::parse(token(&reply, 8, COMMAND)?, token(&reply, 7, COMMAND)?)?;
        Ok(DiskUsage {
            hostname: token(&reply, 1, COMMAND)?.to_string(),
            dir: token(&reply, 2, COMMAND)?.to_string(),
            total,
            used,
            free: total.saturating_sub(used),
        })
    }

    pub fn load(&mut self) -> Result<Load> {
        const COMMAND: &str = "QUERY_LOAD";
        let reply = self.request(&[COMMAND])?;
        Ok(Load {
            one: token(&reply, 0, COMMAND)?.to_string(),
            five: token(&reply, 1, COMMAND)?.to_string(),
            fifteen: token(&reply, 2, COMMAND)?.to_string(),
        })
    }

    /// Backend uptime; `None` when the host cannot report it.
    pub fn uptime(&mut self) -> Result<Option<Duration>> {
        let reply = self.request(&["QUERY_UPTIME"])?;
        Ok(token(&reply, 0, "QUERY_UPTIME")?
            .trim()
            .parse()
            .ok()
            .map(Duration::from_secs))
    }

    /// Human-readable summary of the last guide data run.
    pub fn guide_data_status(&self) -> Result<String> {
        let db = self.db()?;
        let setting = |key: &str| -> Result<String> {
            Ok(db.setting(key)?.unwrap_or_else(|| "unknown".to_string()))
        };
        Ok(format!(
            "Programming guide info retrieved on {} and ended on {}. {}",
            setting("mythfilldatabaseLastRunStart")?,
            setting("mythfilldatabaseLastRunEnd")?,
            setting("mythfilldatabaseLastRunStatus")?,
        ))
    }
}
