//! Non-blocking TCP transport for the netplay readiness loop.
//!
//! This is the lowest layer of netplay. It resolves addresses, binds the
//! listening socket, accepts pending connections without blocking and starts
//! non-blocking outbound connects. Everything above works on the `mio`
//! stream types handed out here.

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::{connect, finish_connect, resolve, TcpAcceptor};
