//! Framed TCP client/server substrate for real-time multi-user applications.
//!
//! netplay moves typed, optionally compressed messages between one server and
//! many clients over plain TCP, framed as `[u16 len][u8 options][u16 type][payload]`.
//!
//! # Crate Structure
//!
//! - [`transport`]: Non-blocking TCP listener and connector
//! - [`frame`]: Envelope framing, reassembly and payload compression
//! - [`codec`]: Schema-driven binary serialization of message records
//! - [`peer`]: Server, client and dispatch registry (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use netplay_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use netplay_frame::*;
}

/// Re-export codec types.
pub mod codec {
    pub use netplay_codec::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use netplay_peer::*;
}
