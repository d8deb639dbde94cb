//! Protocol-version implementations and the lookup table keyed on version.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{BackendError, Result};

/// Behaviour that varies with the negotiated protocol version.
pub trait ProtocolVersion: Send + Sync + fmt::Debug {
    /// Protocol version number.
    fn version(&self) -> u32;

    /// Backend release that speaks this version.
    fn myth_version(&self) -> &str;

    /// Number of tokens in one program record.
    fn record_size(&self) -> usize;

    /// Announce a file transfer socket for `path`.
    fn announce_file_transfer(&self, hostname: &str, path: &str) -> Vec<String> {
        vec![format!("ANN FileTransfer {hostname}"), path.to_string()]
    }
}

/// Table-driven implementation covering every supported version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardProtocol {
    version: u32,
    myth_version: &'static str,
    record_size: usize,
}

impl StandardProtocol {
    pub const fn new(version: u32, myth_version: &'static str, record_size: usize) -> Self {
        Self {
            version,
            myth_version,
            record_size,
        }
    }
}

impl ProtocolVersion for StandardProtocol {
    fn version(&self) -> u32 {
        self.version
    }

    fn myth_version(&self) -> &str {
        self.myth_version
    }

    fn record_size(&self) -> usize {
        self.record_size
    }
}

/// Protocol implementations keyed by version number.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRegistry {
    protocols: HashMap<u32, Arc<dyn ProtocolVersion>>,
}

impl ProtocolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Versions 40 through 50 and 56.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StandardProtocol::new(40, "0.21", 46)));
        for version in 41..=50 {
            registry.register(Arc::new(StandardProtocol::new(version, "0.22", 47)));
        }
        registry.register(Arc::new(StandardProtocol::new(56, "0.23", 47)));
        registry
    }

    /// Register an implementation, replacing any previous one for its version.
    pub fn register(&mut self, protocol: Arc<dyn ProtocolVersion>) {
        self.protocols.insert(protocol.version(), protocol);
    }

    pub fn get(&self, version: u32) -> Option<Arc<dyn ProtocolVersion>> {
        self.protocols.get(&version).cloned()
    }

    /// Look up `version`, failing with [`BackendError::UnsupportedProtocol`].
    pub fn resolve(&self, version: u32) -> Result<Arc<dyn ProtocolVersion>> {
        self.get(version)
            .ok_or(BackendError::UnsupportedProtocol(version))
    }

    /// Registered versions in ascending order.
    pub fn versions(&self) -> Vec<u32> {
        let mut versions: Vec<u32> = self.protocols.keys().copied().collect();
        versions.sort_unstable();
        versions
    }
}
