use std::io::ErrorKind;
use std::net::SocketAddr;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mio::{Events, Interest, Poll, Token, Waker};
use netplay_frame::Envelope;
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, Credentials};
use crate::connection::{Connection, ConnectionShared};
use crate::error::{PeerError, Result};
use crate::events::{ClientEvents, NoEvents};
use crate::id::ConnectionId;
use crate::registry::{Incoming, Registry};
use crate::sync::lock;

const CONNECTION: Token = Token(0);
const WAKER: Token = Token(1);

/// Chunks read per loop pass before queued sends get a turn.
const READ_BUDGET_CHUNKS: usize = 4;

/// Client lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

struct Shared {
    config: ClientConfig,
    state: Mutex<ClientState>,
    state_changed: Condvar,
    connection: Mutex<Option<Arc<ConnectionShared>>>,
    waker: Mutex<Option<Arc<Waker>>>,
    shutdown: AtomicBool,
    loop_thread: Mutex<Option<JoinHandle<()>>>,
    peer_addr: Mutex<Option<SocketAddr>>,
    credentials: Mutex<Option<Credentials>>,
    registry: Registry<ClientHandle>,
    events: Arc<dyn ClientEvents>,
}

impl Shared {
    fn set_state(&self, state: ClientState) {
        *lock(&self.state) = state;
        self.state_changed.notify_all();
    }
}

/// Configures a [`Client`] before it is built.
pub struct ClientBuilder {
    config: ClientConfig,
    registry: Registry<ClientHandle>,
    events: Arc<dyn ClientEvents>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn events(mut self, events: impl ClientEvents) -> Self {
        self.events = Arc::new(events);
        self
    }

    pub fn build(self) -> Client {
        Client {
            handle: ClientHandle {
                shared: Arc::new(Shared {
                    config: self.config,
                    state: Mutex::new(ClientState::Disconnected),
                    state_changed: Condvar::new(),
                    connection: Mutex::new(None),
                    waker: Mutex::new(None),
                    shutdown: AtomicBool::new(false),
                    loop_thread: Mutex::new(None),
                    peer_addr: Mutex::new(None),
                    credentials: Mutex::new(None),
                    registry: self.registry,
                    events: self.events,
                }),
            },
        }
    }
}

/// A single outbound link to a server with its own read loop thread.
///
/// Dropping the `Client` disconnects it.
pub struct Client {
    handle: ClientHandle,
}

impl Client {
    pub fn new(registry: Registry<ClientHandle>) -> Self {
        Self::builder(registry).build()
    }

    pub fn builder(registry: Registry<ClientHandle>) -> ClientBuilder {
        ClientBuilder {
            config: ClientConfig::default(),
            registry,
            events: Arc::new(NoEvents),
        }
    }

    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }
}

impl Deref for Client {
    type Target = ClientHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.handle.disconnect();
    }
}

/// Cloneable access to a client from handlers and other threads.
#[derive(Clone)]
pub struct ClientHandle {
    shared: Arc<Shared>,
}

impl ClientHandle {
    /// Start connecting to `host:port` and spawn the read loop.
    ///
    /// Returns once the connect is under way; use
    /// [`wait_connected`](Self::wait_connected) to block until it completes.
    /// Resolution failures surface here; a refused connect is seen by the
    /// loop, which moves the client back to Disconnected.
    pub fn connect(&self, host: &str, port: u16, credentials: Credentials) -> Result<()> {
        let shared = &self.shared;
        {
            let mut state = lock(&shared.state);
            if *state != ClientState::Disconnected {
                return Err(PeerError::AlreadyConnected);
            }
            *state = ClientState::Connecting;
            shared.shutdown.store(false, Ordering::Release);
        }
        shared.state_changed.notify_all();

        let previous = lock(&shared.loop_thread).take();
        if let Some(previous) = previous {
            if previous.thread().id() != thread::current().id() {
                let _ = previous.join();
            }
        }

        match self.spawn_loop(host, port, credentials) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(host, port, error = %err, "connect failed");
                *lock(&shared.connection) = None;
                *lock(&shared.waker) = None;
                *lock(&shared.peer_addr) = None;
                shared.set_state(ClientState::Disconnected);
                Err(err)
            }
        }
    }

    fn spawn_loop(&self, host: &str, port: u16, credentials: Credentials) -> Result<()> {
        let (stream, peer_addr) = netplay_transport::connect(host, port)?;
        let poll = Poll::new()?;
        let config = &self.shared.config;
        let mut conn = Connection::with_limits(
            ConnectionId::server(),
            stream,
            peer_addr,
            config.read_chunk_size,
            None,
        );
        poll.registry().register(
            conn.stream_mut(),
            CONNECTION,
            Interest::READABLE | Interest::WRITABLE,
        )?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        debug!(%peer_addr, username = credentials.username(), "connecting");
        *lock(&self.shared.connection) = Some(Arc::clone(conn.shared()));
        *lock(&self.shared.waker) = Some(waker);
        *lock(&self.shared.peer_addr) = Some(peer_addr);
        *lock(&self.shared.credentials) = Some(credentials);

        let read_loop = ReadLoop {
            poll,
            conn,
            connected: false,
            writable: true,
            read_pending: false,
            handle: self.clone(),
        };
        let join = thread::Builder::new()
            .name("netplay-client".to_string())
            .spawn(move || read_loop.run())?;
        *lock(&self.shared.loop_thread) = Some(join);
        Ok(())
    }

    /// Queue `envelope` for the server and wake the loop to write it.
    pub fn send(&self, envelope: &Envelope) -> Result<()> {
        if self.state() != ClientState::Connected {
            return Err(PeerError::NotConnected);
        }
        let frame = envelope.encode()?;
        let conn = lock(&self.shared.connection)
            .clone()
            .ok_or(PeerError::NotConnected)?;
        if !conn.enqueue(frame) {
            return Err(PeerError::NotConnected);
        }
        self.wake();
        Ok(())
    }

    /// Close the link and wait for the read loop. Idempotent.
    ///
    /// From a handler or callback it only requests the disconnect; the loop
    /// finishes it once the callback returns.
    pub fn disconnect(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.wake();

        let join = {
            let mut slot = lock(&self.shared.loop_thread);
            match slot.as_ref() {
                Some(join) if join.thread().id() == thread::current().id() => None,
                _ => slot.take(),
            }
        };
        if let Some(join) = join {
            if join.join().is_err() {
                error!("client loop panicked");
                *lock(&self.shared.connection) = None;
                self.shared.set_state(ClientState::Disconnected);
            }
        }
    }

    /// Block until connected. False on timeout or if the attempt failed.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        let state = lock(&self.shared.state);
        let (state, _) = self
            .shared
            .state_changed
            .wait_timeout_while(state, timeout, |state| *state == ClientState::Connecting)
            .unwrap_or_else(PoisonError::into_inner);
        *state == ClientState::Connected
    }

    fn wake(&self) {
        if let Some(waker) = lock(&self.shared.waker).as_ref() {
            if let Err(err) = waker.wake() {
                warn!(error = %err, "failed to wake client loop");
            }
        }
    }

    pub fn state(&self) -> ClientState {
        *lock(&self.shared.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &Registry<ClientHandle> {
        &self.shared.registry
    }

    /// Server address of the current or last attempt.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *lock(&self.shared.peer_addr)
    }

    /// Credentials given to the current or last [`connect`](Self::connect).
    pub fn credentials(&self) -> Option<Credentials> {
        lock(&self.shared.credentials).clone()
    }
}

/// State owned by the client loop thread.
struct ReadLoop {
    poll: Poll,
    conn: Connection,
    connected: bool,
    writable: bool,
    /// The read budget ran out with data left in the socket.
    read_pending: bool,
    handle: ClientHandle,
}

impl ReadLoop {
    fn run(mut self) {
        let shared = Arc::clone(&self.handle.shared);
        let mut events = Events::with_capacity(shared.config.events_capacity.max(1));
        let deadline = Instant::now() + shared.config.connect_timeout;

        let reason = loop {
            if shared.shutdown.load(Ordering::Acquire) {
                break "disconnect requested";
            }
            let timeout = if self.read_pending {
                Some(Duration::ZERO)
            } else if self.connected {
                None
            } else {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    break "connect timed out";
                }
                Some(left)
            };

            if let Err(err) = self.poll.poll(&mut events, timeout) {
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %err, "client poll failed");
                break "poll failed";
            }
            if let Some(reason) = self.process(&events) {
                break reason;
            }
        };
        self.finish(reason);
    }

    fn process(&mut self, events: &Events) -> Option<&'static str> {
        let read_pending = std::mem::take(&mut self.read_pending);
        for event in events.iter() {
            if event.token() != CONNECTION {
                continue;
            }
            if !self.connected {
                match netplay_transport::finish_connect(self.conn.stream_mut()) {
                    Ok(true) => self.established(),
                    Ok(false) => continue,
                    Err(err) => {
                        warn!(peer_addr = %self.conn.info().peer_addr, error = %err, "connect failed");
                        return Some("connect failed");
                    }
                }
            }
            if event.is_readable() || event.is_read_closed() || event.is_error() {
                if let Some(reason) = self.read_ready() {
                    return Some(reason);
                }
            }
        }
        if read_pending {
            if let Some(reason) = self.read_ready() {
                return Some(reason);
            }
        }
        if self.connected {
            self.flush()
        } else {
            None
        }
    }

    fn established(&mut self) {
        self.connected = true;
        self.handle.shared.set_state(ClientState::Connected);
        info!(peer_addr = %self.conn.info().peer_addr, "connected");
        self.notify(|events, handle| events.on_connected(handle));
    }

    fn read_ready(&mut self) -> Option<&'static str> {
        for _ in 0..READ_BUDGET_CHUNKS {
            match self.read_chunk() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(reason) => return Some(reason),
            }
        }
        self.read_pending = true;
        None
    }

    /// `Ok(true)` when the socket may hold more data.
    fn read_chunk(&mut self) -> std::result::Result<bool, &'static str> {
        let outcome = self.conn.read_chunk();
        let more = outcome.as_ref().is_ok_and(|outcome| outcome.limited);

        let mut envelopes = Vec::new();
        let mut malformed = None;
        for frame in self.conn.frames() {
            match frame {
                Ok(envelope) => envelopes.push(envelope),
                Err(err) => {
                    malformed = Some(err);
                    break;
                }
            }
        }

        for envelope in envelopes {
            if self.handle.shared.shutdown.load(Ordering::Acquire) {
                break;
            }
            let incoming = Incoming::new(envelope, ConnectionId::server());
            self.handle.shared.registry.dispatch(&self.handle, &incoming);
        }

        match (outcome, malformed) {
            (_, Some(err)) => {
                warn!(error = %err, "malformed frame from server, disconnecting");
                Err("malformed frame")
            }
            (Err(err), None) => {
                debug!(error = %err, "read failed");
                Err("read error")
            }
            (Ok(outcome), None) if outcome.eof => Err("closed by server"),
            _ => Ok(more && !self.handle.shared.shutdown.load(Ordering::Acquire)),
        }
    }

    /// Drain queued sends and keep WRITABLE interest only while data remains.
    fn flush(&mut self) -> Option<&'static str> {
        match self.conn.drain_writable() {
            Ok(remaining) if remaining == self.writable => None,
            Ok(remaining) => {
                let interest = if remaining {
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                match self
                    .poll
                    .registry()
                    .reregister(self.conn.stream_mut(), CONNECTION, interest)
                {
                    Ok(()) => {
                        self.writable = remaining;
                        None
                    }
                    Err(err) => {
                        debug!(error = %err, "reregister failed");
                        Some("write error")
                    }
                }
            }
            Err(err) => {
                debug!(error = %err, "write failed");
                Some("write error")
            }
        }
    }

    fn finish(mut self, reason: &'static str) {
        // Sends queued just before a requested disconnect still go out.
        if self.connected {
            if let Err(err) = self.conn.drain_writable() {
                debug!(error = %err, "final flush failed");
            }
        }
        if let Err(err) = self.poll.registry().deregister(self.conn.stream_mut()) {
            debug!(error = %err, "deregister failed");
        }
        self.conn.close();

        let shared = Arc::clone(&self.handle.shared);
        *lock(&shared.connection) = None;
        *lock(&shared.waker) = None;
        shared.set_state(ClientState::Disconnected);
        info!(reason, "disconnected");

        if self.connected {
            self.notify(|events, handle| events.on_disconnected(handle));
        }
    }

    fn notify(&self, callback: impl FnOnce(&dyn ClientEvents, &ClientHandle)) {
        let events = self.handle.shared.events.as_ref();
        if catch_unwind(AssertUnwindSafe(|| callback(events, &self.handle))).is_err() {
            error!("client event callback panicked");
        }
    }
}
