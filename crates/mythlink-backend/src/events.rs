//! Domain events published after the backend confirms a change.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error, warn};

use crate::domain::ProgramRecord;
use crate::error::Result;

pub const RECORDING_DELETED: &str = "RECORDING_DELETED";
pub const SETTING_CHANGED: &str = "SETTING_CHANGED";

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The backend acknowledged a `DELETE_RECORDING`.
    RecordingDeleted { program: ProgramRecord },
    /// A setting was replaced with a different value.
    SettingChanged {
        tag: String,
        old: String,
        new: String,
    },
}

impl Event {
    pub fn id(&self) -> &'static str {
        match self {
            Event::RecordingDeleted { .. } => RECORDING_DELETED,
            Event::SettingChanged { .. } => SETTING_CHANGED,
        }
    }
}

/// Sink for domain events.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: &Event);
}

/// Receiver registered on a [`ListenerBus`].
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event) -> Result<()>;
}

/// Fan-out bus that delivers each event to every registered listener.
///
/// A failing listener is logged and does not stop delivery to the others.
#[derive(Default)]
pub struct ListenerBus {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl ListenerBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn EventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Remove a listener previously registered. Returns false if it was not found.
    pub fn deregister(&self, listener: &Arc<dyn EventListener>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match listeners.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => {
                error!("deregister: listener not registered");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventBus for ListenerBus {
    fn publish(&self, event: &Event) {
        // Snapshot so listeners may (de)register while being notified.
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(event = event.id(), listeners = listeners.len(), "publishing event");
        for listener in listeners {
            if let Err(err) = listener.on_event(event) {
                warn!(event = event.id(), error = %err, "listener failed");
            }
        }
    }
}
