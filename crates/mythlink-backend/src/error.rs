use std::io;

use mythlink_frame::FrameError;
use mythlink_transport::TransportError;

/// Broad classification of a [`BackendError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local misuse: bad arguments, inconsistent replies the client cannot use,
    /// a failing local sink or collaborator.
    Client,
    /// The backend explicitly refused the request.
    Server,
    /// Version mismatch or a reply that does not have the expected shape.
    Protocol,
    /// Socket-level failure or unexpected closure.
    Transport,
}

/// Errors that can occur talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The client was asked to do something it cannot.
    #[error("client error: {0}")]
    Client(String),

    /// The backend refused the request.
    #[error("server error: {0}")]
    Server(String),

    /// The backend speaks an older protocol than the client requested.
    #[error("protocol mismatch: server protocol version {server}, client protocol version {client}")]
    ProtocolMismatch { server: u32, client: u32 },

    /// No implementation is registered for the negotiated version.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(u32),

    /// The reply did not have the shape the command expects.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Writing transferred bytes to the local destination failed.
    #[error("destination write failed: {0}")]
    Sink(#[source] io::Error),

    /// A collaborator (database, settings) failed or is missing.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// The connection was already closed.
    #[error("connection closed")]
    Closed,
}

impl BackendError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Transport(_) | BackendError::Closed => ErrorKind::Transport,
            BackendError::Frame(err) => match err {
                FrameError::Io(_) | FrameError::ConnectionClosed => ErrorKind::Transport,
                FrameError::InvalidLength(_)
                | FrameError::PayloadTooLarge { .. }
                | FrameError::InvalidInteger { .. } => ErrorKind::Protocol,
            },
            BackendError::Client(_) | BackendError::Sink(_) | BackendError::Collaborator(_) => {
                ErrorKind::Client
            }
            BackendError::Server(_) => ErrorKind::Server,
            BackendError::ProtocolMismatch { .. }
            | BackendError::UnsupportedProtocol(_)
            | BackendError::UnexpectedReply(_) => ErrorKind::Protocol,
        }
    }

    /// Domain failures are recoverable; transport failures are not.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Transport
    }

    /// Server version carried by a protocol mismatch.
    pub fn server_version(&self) -> Option<u32> {
        match self {
            BackendError::ProtocolMismatch { server, .. } => Some(*server),
            _ => None,
        }
    }

    /// True when a socket read or write ran into its configured deadline.
    pub fn is_timeout(&self) -> bool {
        let io = match self {
            BackendError::Frame(FrameError::Io(err)) => err,
            BackendError::Transport(TransportError::Io(err))
            | BackendError::Transport(TransportError::Connect { source: err, .. }) => err,
            _ => return false,
        };
        matches!(io.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;
