/// Errors that can occur in TCP transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// The host/port pair did not resolve to a socket address.
    #[error("failed to resolve {addr}: {reason}")]
    Resolve { addr: String, reason: String },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Whether an accept failure concerned only the one incoming connection,
    /// so the listener can keep accepting right away.
    ///
    /// Anything else (descriptor exhaustion, out of memory) should be retried
    /// after a pause.
    pub fn is_per_connection(&self) -> bool {
        match self {
            TransportError::Accept(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Error, ErrorKind};

    use super::*;

    #[test]
    fn aborted_handshakes_are_per_connection() {
        let aborted = TransportError::Accept(Error::from(ErrorKind::ConnectionAborted));
        assert!(aborted.is_per_connection());

        let exhausted = TransportError::Accept(Error::other("too many open files"));
        assert!(!exhausted.is_per_connection());

        let io = TransportError::Io(Error::from(ErrorKind::ConnectionReset));
        assert!(!io.is_per_connection());
    }
}
