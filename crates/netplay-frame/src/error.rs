/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit in a single frame.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The declared frame length cannot hold the options and type header.
    #[error("malformed frame length {declared} (minimum {min})")]
    MalformedLength { declared: u16, min: u16 },

    /// The payload filter failed to compress a payload.
    #[error("compression failed: {0}")]
    Compression(String),

    /// The payload filter failed to decompress a payload.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
