use std::time::Duration;

use mythlink_frame::FrameConfig;
use mythlink_transport::TcpEndpoint;

use crate::collaborators::{SettingsStore, SETTING_HOST, SETTING_PORT};
use crate::error::{BackendError, Result};

/// Default backend command port.
pub const DEFAULT_PORT: u16 = 6543;
/// Protocol version sent when probing a backend.
pub const DEFAULT_CLIENT_VERSION: u32 = 40;
/// Largest block requested per `REQUEST_BLOCK`.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 2_000_000;

/// Everything needed to open connections to one master backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Master backend host. Default: `localhost`.
    pub host: String,
    /// Master backend port. Default: 6543.
    pub port: u16,
    /// Protocol version offered during negotiation. Default: 40.
    pub client_version: u32,
    /// Name this client announces itself with. Default: the local host name.
    pub client_hostname: String,
    /// Framing and socket deadlines.
    pub frame: FrameConfig,
    /// Maximum file transfer block size in bytes. Default: 2,000,000.
    pub max_block_size: usize,
    /// Deadline for establishing a TCP connection. Default: none.
    pub connect_timeout: Option<Duration>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            client_version: DEFAULT_CLIENT_VERSION,
            client_hostname: local_hostname(),
            frame: FrameConfig::default(),
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            connect_timeout: None,
        }
    }
}

impl BackendConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Read host and port from the settings collaborator.
    pub fn from_settings(settings: &dyn SettingsStore) -> Result<Self> {
        let mut config = Self::default();
        if let Some(host) = settings.get(SETTING_HOST) {
            config.host = host;
        }
        if let Some(port) = settings.get(SETTING_PORT) {
            config.port = port.trim().parse().map_err(|_| {
                BackendError::Collaborator(format!("invalid {SETTING_PORT} setting {port:?}"))
            })?;
        }
        Ok(config)
    }

    /// Apply one deadline to connect, read and write.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self.frame.read_timeout = Some(timeout);
        self.frame.write_timeout = Some(timeout);
        self
    }

    /// The master backend endpoint.
    pub fn endpoint(&self) -> TcpEndpoint {
        TcpEndpoint::new(self.host.clone(), self.port)
    }

    /// Whether `host` names the master backend.
    pub fn is_master(&self, host: &str) -> bool {
        host == self.host
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
