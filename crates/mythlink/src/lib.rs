//! Client for a DVR recording backend.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP endpoints and backend sockets
//! - [`frame`]: length-prefixed token framing and the 64-bit integer split
//! - [`backend`]: negotiation, connections, commands, file transfer and pool binding

/// Re-export transport types.
pub mod transport {
    pub use mythlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use mythlink_frame::*;
}

/// Re-export backend types.
pub mod backend {
    pub use mythlink_backend::*;
}
