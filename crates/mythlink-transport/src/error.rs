/// Errors that can occur in backend transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint did not resolve to any socket address.
    #[error("failed to resolve {addr}")]
    Resolve { addr: String },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
