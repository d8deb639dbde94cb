//! `MYTH_PROTO_VERSION` negotiation and the negotiated-version cache.

use std::io::{Read, Write};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::{BackendError, Result};
use crate::protocol::{ProtocolRegistry, ProtocolVersion};
use crate::session::Session;

/// Command that opens every backend conversation.
pub const PROTO_COMMAND: &str = "MYTH_PROTO_VERSION";

/// Send `MYTH_PROTO_VERSION <client_version>` and return the server's version.
///
/// Fails with [`BackendError::ProtocolMismatch`] when the server is older
/// than `client_version`. There is no automatic retry.
pub fn exchange<R: Read, W: Write>(session: &mut Session<R, W>, client_version: u32) -> Result<u32> {
    let reply = session.request(&[format!("{PROTO_COMMAND} {client_version}")])?;
    let (response, server_version) = match reply.tokens() {
        [response, version, ..] => (response.as_str(), version),
        _ => {
            return Err(BackendError::UnexpectedReply(format!(
                "{PROTO_COMMAND} reply {reply}"
            )))
        }
    };
    let server_version: u32 = server_version.trim().parse().map_err(|_| {
        BackendError::UnexpectedReply(format!("{PROTO_COMMAND} version {server_version:?}"))
    })?;
    debug!(client_version, response, server_version, "protocol exchange");

    if server_version < client_version {
        return Err(BackendError::ProtocolMismatch {
            server: server_version,
            client: client_version,
        });
    }
    Ok(server_version)
}

/// Owns the protocol registry and the negotiated server version.
///
/// One negotiator is shared (via `Arc`) by every connection to the same
/// backend, so the version is probed once.
#[derive(Debug)]
pub struct Negotiator {
    registry: ProtocolRegistry,
    client_version: u32,
    negotiated: RwLock<Option<u32>>,
}

impl Negotiator {
    pub fn new(registry: ProtocolRegistry, client_version: u32) -> Self {
        Self {
            registry,
            client_version,
            negotiated: RwLock::new(None),
        }
    }

    /// A negotiator over [`ProtocolRegistry::standard`].
    pub fn standard(client_version: u32) -> Arc<Self> {
        Arc::new(Self::new(ProtocolRegistry::standard(), client_version))
    }

    /// A negotiator whose server version is already known.
    pub fn pinned(registry: ProtocolRegistry, version: u32) -> Self {
        let negotiator = Self::new(registry, version);
        negotiator.store(version);
        negotiator
    }

    pub fn client_version(&self) -> u32 {
        self.client_version
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    /// The negotiated server version, if any.
    pub fn cached(&self) -> Option<u32> {
        *self.negotiated.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget the negotiated version; the next connection probes again.
    pub fn invalidate(&self) {
        *self.negotiated.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn store(&self, version: u32) {
        *self.negotiated.write().unwrap_or_else(PoisonError::into_inner) = Some(version);
    }

    /// Return the server version, sending the handshake only on a cache miss.
    pub fn negotiate<R: Read, W: Write>(&self, session: &mut Session<R, W>) -> Result<u32> {
        if let Some(version) = self.cached() {
            debug!(version, "protocol version cached");
            return Ok(version);
        }

        let version = exchange(session, self.client_version)?;
        self.store(version);
        info!(version, "negotiated protocol version");
        Ok(version)
    }

    /// Send the negotiated version on a fresh socket and resolve its implementation.
    ///
    /// The backend requires the handshake on every new socket.
    pub fn handshake<R: Read, W: Write>(
        &self,
        session: &mut Session<R, W>,
        version: u32,
    ) -> Result<Arc<dyn ProtocolVersion>> {
        let server_version = exchange(session, version)?;
        self.registry.resolve(server_version)
    }
}
