//! Server, client and message dispatch for netplay.
//!
//! This is the "just works" layer. A [`Server`] accepts TCP connections on a
//! single readiness-loop thread, admits up to a configured number of them and
//! fans envelopes out by id. A [`Client`] keeps one link to a server with its
//! own read loop. Both hand every received envelope to a [`Registry`], which
//! routes it by message type id to the handler registered at startup.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod id;
pub mod registry;
pub mod server;
mod sync;

pub use client::{Client, ClientBuilder, ClientHandle, ClientState};
pub use config::{ClientConfig, Credentials, ServerConfig};
pub use connection::{Connection, ConnectionInfo, ConnectionState};
pub use error::{PeerError, Result};
pub use events::{ClientEvents, NoEvents, ServerEvents};
pub use id::{random_ids, ConnectionId, IdGenerator, SERVER_SENDER};
pub use registry::{DispatchOutcome, Incoming, Registry};
pub use server::{Server, ServerBuilder, ServerHandle, ServerState};
