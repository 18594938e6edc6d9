//! Length-prefixed envelope framing for netplay.
//!
//! Every message on the wire is framed as:
//! - a 2-byte big-endian length covering everything after it
//! - a 1-byte options field (bit 0 = compressed)
//! - a 2-byte big-endian message type id
//! - the payload
//!
//! [`FrameDecoder`] reassembles frames from arbitrary read boundaries and
//! [`FrameQueue`] keeps outbound frames whole across partial writes.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod compression;
pub mod decoder;
pub mod error;
pub mod options;
pub mod queue;

#[cfg(feature = "async")]
pub use async_codec::EnvelopeCodec;
pub use codec::{
    decode_frame, encode_frame, hex_dump, Envelope, HEADER_SIZE, LENGTH_PREFIX_SIZE, MAX_PAYLOAD,
    MIN_FRAME_LENGTH,
};
pub use compression::{DeflateFilter, NoCompression, PayloadFilter, ZstdFilter};
pub use decoder::{FrameDecoder, Frames, ReadOutcome, DEFAULT_READ_CHUNK_SIZE};
pub use error::{FrameError, Result};
pub use options::Options;
pub use queue::FrameQueue;
