//! Application callbacks invoked from the owning readiness loop.
//!
//! Callbacks run on the loop thread; long work in them delays every
//! connection served by that loop.

use crate::client::ClientHandle;
use crate::connection::ConnectionInfo;
use crate::server::ServerHandle;

/// Connection lifecycle notifications for a server.
pub trait ServerEvents: Send + Sync + 'static {
    /// A socket was accepted and entered the connection table.
    fn on_user_connected(&self, _server: &ServerHandle, _connection: &ConnectionInfo) {}

    /// A connection left the table and its socket was closed.
    fn on_user_disconnected(&self, _server: &ServerHandle, _connection: &ConnectionInfo) {}
}

/// Connection lifecycle notifications for a client.
pub trait ClientEvents: Send + Sync + 'static {
    fn on_connected(&self, _client: &ClientHandle) {}

    /// Only fires after a successful [`on_connected`](Self::on_connected).
    fn on_disconnected(&self, _client: &ClientHandle) {}
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl ServerEvents for NoEvents {}

impl ClientEvents for NoEvents {}
