//! Backend connection management for a DVR recording server.
//!
//! Opens command sockets, negotiates the protocol version, announces, and
//! runs typed commands over them. Files are pulled over a separate data
//! socket. Catalog, settings and events are reached through collaborator
//! traits.

pub mod collaborators;
pub mod commands;
pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod events;
pub mod negotiate;
pub mod pool;
pub mod protocol;
pub mod session;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use collaborators::{Database, MemorySettings, SettingsStore, SETTING_HOST, SETTING_PORT};
pub use commands::{ALL_GROUPS, ALL_SHOWS};
pub use config::{
    BackendConfig, DEFAULT_CLIENT_VERSION, DEFAULT_MAX_BLOCK_SIZE, DEFAULT_PORT,
};
pub use connection::{Announce, Connection};
pub use domain::{
    ChainId, Channel, CommercialBreak, DiskUsage, FreeTuner, Job, Load, ProgramRecord,
    ProgramSummary, RecordingStatus, Schedule, Tuner, TunerState, UpcomingFilter,
    DEFAULT_FRAME_RATE, LIVE_TV_GROUP,
};
pub use error::{BackendError, ErrorKind, Result};
pub use events::{Event, EventBus, EventListener, ListenerBus, RECORDING_DELETED, SETTING_CHANGED};
pub use negotiate::{Negotiator, PROTO_COMMAND};
pub use pool::{
    ConnectionFactory, ConnectionPool, Injected, PoolBinding, PoolableFactory,
    UnpooledConnections,
};
pub use protocol::{ProtocolRegistry, ProtocolVersion, StandardProtocol};
pub use session::{BackendSession, Session, DONE};
pub use transfer::{pull_blocks, FileTransfer};

/// Tracing target for pool binding decisions.
pub const INJECT_TARGET: &str = "mythlink::inject";
