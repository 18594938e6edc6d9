use std::fmt;
use std::sync::Arc;

/// Sender id attached to every message a client receives.
pub const SERVER_SENDER: &str = "SERVER";

/// Opaque connection identifier.
///
/// Random ids are 128-bit lowercase hex. Uniqueness is only required among
/// live connections; the server regenerates on collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// A fresh random id.
    pub fn random() -> Self {
        let bits: u128 = rand::random();
        Self(format!("{bits:032x}").into())
    }

    /// The id clients see as the sender of server messages.
    pub fn server() -> Self {
        Self(SERVER_SENDER.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id.into())
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of ids for accepted connections.
pub type IdGenerator = Arc<dyn Fn() -> ConnectionId + Send + Sync>;

/// The default generator: [`ConnectionId::random`].
pub fn random_ids() -> IdGenerator {
    Arc::new(ConnectionId::random)
}
