use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use mythlink_frame::Message;
use tracing::{debug, warn};

use crate::collaborators::Database;
use crate::config::BackendConfig;
use crate::error::{BackendError, Result};
use crate::events::EventBus;
use crate::negotiate::Negotiator;
use crate::protocol::ProtocolVersion;
use crate::session::BackendSession;

/// Purpose declared for a command socket right after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announce {
    /// Keeps the backend from shutting down while connected.
    Playback,
    /// Lets the backend shut down while connected.
    Monitor,
}

impl Announce {
    pub fn as_str(self) -> &'static str {
        match self {
            Announce::Playback => "Playback",
            Announce::Monitor => "Monitor",
        }
    }

    /// The announce command for `hostname`, e.g. `ANN Playback frontend 0`.
    pub fn command(self, hostname: &str) -> String {
        format!("ANN {} {hostname} 0", self.as_str())
    }
}

impl fmt::Display for Announce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Announce {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Playback" => Ok(Announce::Playback),
            "Monitor" => Ok(Announce::Monitor),
            other => Err(BackendError::Client(format!(
                "unsupported announce command: {other}"
            ))),
        }
    }
}

/// A command socket to the master backend plus its negotiated protocol.
///
/// Created by a factory, used by one thread at a time, closed explicitly.
pub struct Connection {
    config: BackendConfig,
    negotiator: Arc<Negotiator>,
    protocol: Arc<dyn ProtocolVersion>,
    announce: Option<Announce>,
    session: Option<BackendSession>,
    bus: Arc<dyn EventBus>,
    db: Option<Arc<dyn Database>>,
}

impl Connection {
    /// Connect to the master backend and announce for playback.
    pub fn open(
        config: BackendConfig,
        negotiator: Arc<Negotiator>,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self> {
        Self::open_with(config, negotiator, bus, Some(Announce::Playback))
    }

    /// Connect to the master backend with an explicit announce mode.
    pub fn open_with(
        config: BackendConfig,
        negotiator: Arc<Negotiator>,
        bus: Arc<dyn EventBus>,
        announce: Option<Announce>,
    ) -> Result<Self> {
        let (session, protocol) = open_socket(&config, &negotiator, announce, None)?;
        Ok(Self {
            config,
            negotiator,
            protocol,
            announce,
            session: Some(session),
            bus,
            db: None,
        })
    }

    /// Attach the catalog used by database-backed operations.
    pub fn with_database(mut self, db: Arc<dyn Database>) -> Self {
        self.db = Some(db);
        self
    }

    /// Open an additional socket to `target_host` (the master when `None`).
    ///
    /// Runs the handshake and, if requested, the announce. The caller owns the
    /// returned socket and must close it.
    pub fn connect(
        &self,
        announce: Option<Announce>,
        target_host: Option<&str>,
    ) -> Result<BackendSession> {
        let (session, _) = open_socket(&self.config, &self.negotiator, announce, target_host)?;
        Ok(session)
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn protocol(&self) -> &dyn ProtocolVersion {
        self.protocol.as_ref()
    }

    pub fn protocol_version(&self) -> u32 {
        self.protocol.version()
    }

    pub fn announce(&self) -> Option<Announce> {
        self.announce
    }

    pub(crate) fn bus(&self) -> &dyn EventBus {
        self.bus.as_ref()
    }

    pub(crate) fn db(&self) -> Result<&dyn Database> {
        self.db
            .as_deref()
            .ok_or_else(|| BackendError::Collaborator("no database configured".into()))
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    /// The command socket.
    pub fn session(&mut self) -> Result<&mut BackendSession> {
        self.session.as_mut().ok_or(BackendError::Closed)
    }

    /// Send a request on the command socket and read its reply.
    pub fn request<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<Message> {
        self.session()?.request(tokens)
    }

    /// Shut down a command socket whose replies no longer line up with its
    /// requests. Later requests fail with [`BackendError::Closed`].
    pub(crate) fn discard(&mut self) {
        if let Some(session) = self.session.take() {
            warn!(host = %self.config.host, "discarding out-of-sync command socket");
            if let Err(err) = session.shutdown() {
                warn!(host = %self.config.host, error = %err, "failed to shut down command socket");
            }
        }
    }

    /// Send `DONE` and shut the command socket down. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => {
                debug!(host = %self.config.host, "closing connection");
                session.close()
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("protocol", &self.protocol.version())
            .field("announce", &self.announce)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Open, negotiate and announce one socket.
fn open_socket(
    config: &BackendConfig,
    negotiator: &Negotiator,
    announce: Option<Announce>,
    target_host: Option<&str>,
) -> Result<(BackendSession, Arc<dyn ProtocolVersion>)> {
    let version = match negotiator.cached() {
        Some(version) => version,
        None => probe(config, negotiator)?,
    };

    let endpoint = match target_host {
        Some(host) => config.endpoint().with_host(host),
        None => config.endpoint(),
    };
    let mut session = BackendSession::connect(&endpoint, &config.frame, config.connect_timeout)?;
    let protocol = negotiator.handshake(&mut session, version)?;

    if let Some(mode) = announce {
        let reply = session.request(&[mode.command(&config.client_hostname)])?;
        if !reply.is_ok() {
            return Err(BackendError::Server(format!(
                "backend {} refused: {reply}",
                mode.as_str().to_lowercase()
            )));
        }
    }
    debug!(%endpoint, version = protocol.version(), ?announce, "backend socket ready");
    Ok((session, protocol))
}

/// Learn the server version on a throw-away socket to the master.
fn probe(config: &BackendConfig, negotiator: &Negotiator) -> Result<u32> {
    let mut session =
        BackendSession::connect(&config.endpoint(), &config.frame, config.connect_timeout)?;
    let version = negotiator.negotiate(&mut session);
    if let Err(err) = session.shutdown() {
        warn!(error = %err, "failed to shut down probe socket");
    }
    version
}
