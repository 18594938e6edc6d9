/// Errors that can occur in server, client and dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] netplay_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] netplay_frame::FrameError),

    /// Record serialization error.
    #[error("codec error: {0}")]
    Codec(#[from] netplay_codec::CodecError),

    /// `start` was called on a server that is not stopped.
    #[error("server is already running")]
    AlreadyRunning,

    /// `connect` was called on a client that is not disconnected.
    #[error("client is already connected or connecting")]
    AlreadyConnected,

    /// The server is not running.
    #[error("server is not running")]
    NotRunning,

    /// The client is not connected.
    #[error("client is not connected")]
    NotConnected,

    /// A required credential is empty.
    #[error("missing credentials: {0} must not be empty")]
    MissingCredentials(&'static str),

    /// A handler is already registered for this message type.
    #[error("message type {0} already has a handler")]
    DuplicateRegistration(u16),

    /// Application handler reported a failure.
    #[error("handler failed: {0}")]
    Handler(String),

    /// Socket or readiness loop I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PeerError>;
