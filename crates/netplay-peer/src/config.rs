use std::fmt;
use std::time::Duration;

use netplay_frame::DEFAULT_READ_CHUNK_SIZE;

use crate::error::{PeerError, Result};

/// Server behavior. Fixed for the lifetime of a [`Server`](crate::Server).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Connections accepted concurrently; further sockets are closed on accept.
    pub max_connections: usize,
    /// Bytes requested per socket read.
    pub read_chunk_size: usize,
    /// Capacity of the readiness event buffer.
    pub events_capacity: usize,
    /// Optional cap on bytes queued for one connection; frames beyond it are dropped.
    pub max_queued_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 64,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            events_capacity: 1024,
            max_queued_bytes: None,
        }
    }
}

impl ServerConfig {
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size;
        self
    }

    pub fn with_events_capacity(mut self, events_capacity: usize) -> Self {
        self.events_capacity = events_capacity;
        self
    }

    pub fn with_max_queued_bytes(mut self, max_queued_bytes: usize) -> Self {
        self.max_queued_bytes = Some(max_queued_bytes);
        self
    }
}

/// Client behavior.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bytes requested per socket read.
    pub read_chunk_size: usize,
    /// Capacity of the readiness event buffer.
    pub events_capacity: usize,
    /// How long the loop waits for the connect to complete.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            events_capacity: 64,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn with_read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size;
        self
    }

    pub fn with_events_capacity(mut self, events_capacity: usize) -> Self {
        self.events_capacity = events_capacity;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

/// Login material a client presents. Both parts must be non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();
        if username.trim().is_empty() {
            return Err(PeerError::MissingCredentials("username"));
        }
        if password.is_empty() {
            return Err(PeerError::MissingCredentials("password"));
        }
        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field(
                "password",
                &format_args!("<redacted:{} bytes>", self.password.len()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults_and_builders() {
        let config = ServerConfig::default()
            .with_max_connections(2)
            .with_max_queued_bytes(1024);
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.max_queued_bytes, Some(1024));
        assert_eq!(config.read_chunk_size, DEFAULT_READ_CHUNK_SIZE);
    }

    #[test]
    fn credentials_require_both_parts() {
        assert!(matches!(
            Credentials::new("", "pw"),
            Err(PeerError::MissingCredentials("username"))
        ));
        assert!(matches!(
            Credentials::new("al", ""),
            Err(PeerError::MissingCredentials("password"))
        ));
        let creds = Credentials::new("al", "pw").expect("credentials should be valid");
        assert_eq!(creds.username(), "al");
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials::new("al", "secret").expect("credentials should be valid");
        let debug = format!("{creds:?}");
        assert!(debug.contains("al"));
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted:6 bytes>"));
    }
}
