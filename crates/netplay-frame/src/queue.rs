use std::collections::VecDeque;
use std::io::{self, ErrorKind, Write};

use bytes::{Buf, Bytes};

/// FIFO of encoded frames waiting for a writable socket.
///
/// Frames are written strictly in order and never interleave: a partially
/// written frame keeps its remainder at the head of the queue.
#[derive(Debug, Default)]
pub struct FrameQueue {
    frames: VecDeque<Bytes>,
    queued_bytes: usize,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an encoded frame. Empty buffers are ignored.
    pub fn push(&mut self, frame: Bytes) {
        if frame.is_empty() {
            return;
        }
        self.queued_bytes += frame.len();
        self.frames.push_back(frame);
    }

    /// Write queued frames until the queue is empty or `dst` would block.
    ///
    /// Returns `Ok(true)` if data remains queued. `Interrupted` is retried; a
    /// zero-length write is reported as `WriteZero`.
    pub fn drain_to<W: Write>(&mut self, dst: &mut W) -> io::Result<bool> {
        while let Some(head) = self.frames.front_mut() {
            match dst.write(head) {
                Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
                Ok(n) => {
                    self.queued_bytes -= n;
                    if n == head.len() {
                        self.frames.pop_front();
                    } else {
                        head.advance(n);
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(err) => return Err(err),
            }
        }
        Ok(false)
    }

    /// Number of frames (or frame remainders) queued.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total bytes still to be written.
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    /// Drop everything queued.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.queued_bytes = 0;
    }
}
