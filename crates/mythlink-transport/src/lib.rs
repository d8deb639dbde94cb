//! Blocking TCP transport to a recording backend.
//!
//! This is the lowest layer of mythlink. Everything else builds on top of
//! the [`BackendStream`] type provided here: the command socket, the data
//! socket used by file transfers, and the throw-away socket used to probe
//! the server's protocol version are all plain `BackendStream`s.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::BackendStream;
pub use tcp::TcpEndpoint;
