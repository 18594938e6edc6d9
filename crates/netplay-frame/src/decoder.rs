use std::io::{self, ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, Envelope};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Default number of bytes requested from the source per `read` call.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024;

/// What a non-blocking drain of a readable source produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes appended to the reassembly buffer.
    pub bytes: usize,
    /// The source reported end of stream.
    pub eof: bool,
    /// Stopped at the byte limit before the source would block; more data
    /// may be ready.
    pub limited: bool,
}

/// Stateful reassembly of frames from an arbitrarily fragmented byte stream.
///
/// Bytes go in through [`extend`](Self::extend) or [`read_from`](Self::read_from);
/// complete frames come out of [`next_frame`](Self::next_frame) or
/// [`frames`](Self::frames). A partial frame stays buffered until the rest
/// arrives. Never blocks on its own.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    chunk_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_READ_CHUNK_SIZE)
    }

    /// Create a decoder that requests `chunk_size` bytes per read call.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Append already received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Read from `src` until it would block or reports end of stream.
    ///
    /// `Interrupted` is retried. Any other I/O error is returned; bytes read
    /// before the error stay buffered.
    pub fn read_from<R: Read>(&mut self, src: &mut R) -> io::Result<ReadOutcome> {
        self.read_up_to(src, usize::MAX)
    }

    /// Like [`read_from`](Self::read_from), but stops once `limit` bytes were
    /// appended and sets [`ReadOutcome::limited`].
    pub fn read_up_to<R: Read>(&mut self, src: &mut R, limit: usize) -> io::Result<ReadOutcome> {
        let mut outcome = ReadOutcome::default();
        loop {
            if outcome.bytes >= limit {
                outcome.limited = true;
                return Ok(outcome);
            }
            let want = self.chunk_size.min(limit - outcome.bytes);
            let start = self.buf.len();
            self.buf.resize(start + want, 0);
            let read = src.read(&mut self.buf[start..]);
            match read {
                Ok(0) => {
                    self.buf.truncate(start);
                    outcome.eof = true;
                    return Ok(outcome);
                }
                Ok(n) => {
                    self.buf.truncate(start + n);
                    outcome.bytes += n;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {
                    self.buf.truncate(start);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    self.buf.truncate(start);
                    return Ok(outcome);
                }
                Err(err) => {
                    self.buf.truncate(start);
                    return Err(err);
                }
            }
        }
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Envelope>> {
        decode_frame(&mut self.buf)
    }

    /// Iterate over every complete frame currently buffered.
    ///
    /// Stops after the first error; the decoder should then be discarded
    /// along with its connection.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames {
            decoder: self,
            failed: false,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered partial frame.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Iterator returned by [`FrameDecoder::frames`].
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
    failed: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Envelope>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.decoder.next_frame() {
            Ok(Some(envelope)) => Some(Ok(envelope)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
