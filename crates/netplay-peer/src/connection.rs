use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use mio::net::TcpStream;
use netplay_frame::{Envelope, FrameDecoder, FrameQueue, Frames, ReadOutcome};
use tracing::{debug, warn};

use crate::id::ConnectionId;
use crate::sync::lock;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// Close requested; no longer addressable, socket not yet released.
    Closing,
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Open => 0,
            ConnectionState::Closing => 1,
            ConnectionState::Closed => 2,
        }
    }
}

/// Identity of a connection as seen by callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
}

/// The part of a connection other threads may touch: outbound queue and state.
#[derive(Debug)]
pub(crate) struct ConnectionShared {
    info: ConnectionInfo,
    outbound: Mutex<FrameQueue>,
    state: AtomicU8,
    max_queued_bytes: Option<usize>,
}

impl ConnectionShared {
    pub(crate) fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Move Open → Closing. Returns false if already past Open.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Open.as_u8(),
                ConnectionState::Closing.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn queue(&self) -> MutexGuard<'_, FrameQueue> {
        lock(&self.outbound)
    }

    /// Queue an encoded frame. Returns false if the connection is not open or
    /// its outbound limit would be exceeded.
    pub(crate) fn enqueue(&self, frame: Bytes) -> bool {
        if self.state() != ConnectionState::Open {
            return false;
        }
        let mut queue = self.queue();
        if let Some(max) = self.max_queued_bytes {
            if queue.queued_bytes() + frame.len() > max {
                warn!(
                    connection = %self.info.id,
                    queued = queue.queued_bytes(),
                    size = frame.len(),
                    "outbound queue full, dropping frame"
                );
                return false;
            }
        }
        queue.push(frame);
        true
    }

    pub(crate) fn queued_bytes(&self) -> usize {
        self.queue().queued_bytes()
    }
}

/// One socket with its reassembly buffer and outbound frame queue.
///
/// Owned by the thread running the readiness loop. Other threads reach the
/// outbound queue through the server or client handle only.
pub struct Connection {
    stream: TcpStream,
    decoder: FrameDecoder,
    shared: Arc<ConnectionShared>,
}

impl Connection {
    pub fn new(id: ConnectionId, stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self::with_limits(id, stream, peer_addr, netplay_frame::DEFAULT_READ_CHUNK_SIZE, None)
    }

    /// Create a connection with an explicit read chunk size and outbound cap.
    pub fn with_limits(
        id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        read_chunk_size: usize,
        max_queued_bytes: Option<usize>,
    ) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::with_chunk_size(read_chunk_size),
            shared: Arc::new(ConnectionShared {
                info: ConnectionInfo { id, peer_addr },
                outbound: Mutex::new(FrameQueue::new()),
                state: AtomicU8::new(ConnectionState::Open.as_u8()),
                max_queued_bytes,
            }),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.shared.info.id
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.shared.info
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub(crate) fn shared(&self) -> &Arc<ConnectionShared> {
        &self.shared
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Append an encoded frame to the outbound FIFO. Never blocks on I/O.
    pub fn enqueue_outbound(&self, frame: Bytes) -> bool {
        self.shared.enqueue(frame)
    }

    /// Write queued frames until done or the socket would block.
    ///
    /// Returns whether data remains queued.
    pub fn drain_writable(&mut self) -> io::Result<bool> {
        let mut queue = self.shared.queue();
        queue.drain_to(&mut self.stream)
    }

    /// Whether anything is waiting to be written.
    pub fn has_outbound(&self) -> bool {
        !self.shared.queue().is_empty()
    }

    /// Read everything currently available into the reassembly buffer.
    pub fn read_available(&mut self) -> io::Result<ReadOutcome> {
        self.decoder.read_from(&mut self.stream)
    }

    /// Read at most one `read_chunk_size` worth of bytes.
    ///
    /// [`ReadOutcome::limited`] reports that the socket may still hold data;
    /// with edge-triggered readiness no further event arrives for it.
    pub fn read_chunk(&mut self) -> io::Result<ReadOutcome> {
        let limit = self.decoder.chunk_size();
        self.decoder.read_up_to(&mut self.stream, limit)
    }

    /// Complete frames buffered so far.
    pub fn frames(&mut self) -> Frames<'_> {
        self.decoder.frames()
    }

    /// Append received bytes and return every frame they complete.
    pub fn feed_inbound(&mut self, bytes: &[u8]) -> netplay_frame::Result<Vec<Envelope>> {
        self.decoder.extend(bytes);
        self.decoder.frames().collect()
    }

    /// Release the socket. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        self.shared.begin_close();
        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            debug!(connection = %self.id(), error = %err, "socket shutdown failed");
        }
        self.shared.queue().clear();
        self.decoder.clear();
        self.shared.set_state(ConnectionState::Closed);
    }
}
