//! Narrow interfaces to the parts of the client this crate does not own.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::{Channel, Job, ProgramRecord, Schedule, Tuner};
use crate::error::Result;
use crate::events::{Event, EventBus};

/// Settings key holding the master backend host.
pub const SETTING_HOST: &str = "mythtv_host";
/// Settings key holding the master backend port.
pub const SETTING_PORT: &str = "mythtv_port";

/// The recording catalog.
pub trait Database: Send + Sync {
    fn tuners(&self) -> Result<Vec<Tuner>>;

    fn channels(&self) -> Result<Vec<Channel>>;

    /// Jobs queued or run against a recording.
    fn jobs(&self, program: &ProgramRecord) -> Result<Vec<Job>>;

    /// A backend-wide setting stored in the catalog.
    fn setting(&self, key: &str) -> Result<Option<String>>;

    /// Insert or update; assigns `schedule.id` on insert.
    fn save_schedule(&self, schedule: &mut Schedule) -> Result<()>;

    fn delete_schedule(&self, schedule: &Schedule) -> Result<()>;
}

/// Local key/value settings.
pub trait SettingsStore: Send + Sync {
    fn get(&self, tag: &str) -> Option<String>;

    fn put(&self, tag: &str, value: &str);
}

/// In-memory [`SettingsStore`].
///
/// Replacing an existing value with a different one publishes
/// [`Event::SettingChanged`] on the attached bus.
#[derive(Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
    bus: Option<Arc<dyn EventBus>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings pre-populated with the backend defaults.
    pub fn with_defaults() -> Self {
        let settings = Self::new();
        settings.put(SETTING_HOST, "localhost");
        settings.put(SETTING_PORT, "6543");
        settings
    }

    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, tag: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .cloned()
    }

    fn put(&self, tag: &str, value: &str) {
        let old = self
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag.to_string(), value.to_string());

        if let (Some(old), Some(bus)) = (old, &self.bus) {
            if old != value {
                bus.publish(&Event::SettingChanged {
                    tag: tag.to_string(),
                    old,
                    new: value.to_string(),
                });
            }
        }
    }
}
