use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use mio::event::Event;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use netplay_frame::Envelope;
use netplay_transport::TcpAcceptor;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionInfo, ConnectionShared};
use crate::error::{PeerError, Result};
use crate::events::{NoEvents, ServerEvents};
use crate::id::{random_ids, ConnectionId, IdGenerator};
use crate::registry::{Incoming, Registry};
use crate::sync::{lock, read, write};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

/// Attempts at drawing an id that no live connection uses.
const ID_ATTEMPTS: usize = 16;

/// Chunks read from one connection per loop pass before moving on.
const READ_BUDGET_CHUNKS: usize = 4;

/// Pause before retrying a listener whose accept failed for a
/// non-connection reason (e.g. out of descriptors).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Server lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServerState::Starting,
            2 => ServerState::Running,
            3 => ServerState::Stopping,
            _ => ServerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ServerState::Stopped => 0,
            ServerState::Starting => 1,
            ServerState::Running => 2,
            ServerState::Stopping => 3,
        }
    }
}

/// Work handed from caller threads to the loop.
#[derive(Default)]
struct Pending {
    writes: HashSet<ConnectionId>,
    kicks: Vec<ConnectionId>,
    stop: bool,
}

struct Shared {
    config: ServerConfig,
    state: AtomicU8,
    lifecycle: Mutex<()>,
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionShared>>>,
    pending: Mutex<Pending>,
    waker: Mutex<Option<Arc<Waker>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    loop_thread: Mutex<Option<JoinHandle<()>>>,
    registry: Registry<ServerHandle>,
    events: Arc<dyn ServerEvents>,
    ids: IdGenerator,
}

impl Shared {
    fn set_state(&self, state: ServerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// Configures a [`Server`] before it is built.
pub struct ServerBuilder {
    config: ServerConfig,
    registry: Registry<ServerHandle>,
    events: Arc<dyn ServerEvents>,
    ids: IdGenerator,
}

impl ServerBuilder {
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn events(mut self, events: impl ServerEvents) -> Self {
        self.events = Arc::new(events);
        self
    }

    pub fn id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn build(self) -> Server {
        Server {
            handle: ServerHandle {
                shared: Arc::new(Shared {
                    config: self.config,
                    state: AtomicU8::new(ServerState::Stopped.as_u8()),
                    lifecycle: Mutex::new(()),
                    connections: RwLock::new(HashMap::new()),
                    pending: Mutex::new(Pending::default()),
                    waker: Mutex::new(None),
                    local_addr: Mutex::new(None),
                    loop_thread: Mutex::new(None),
                    registry: self.registry,
                    events: self.events,
                    ids: self.ids,
                }),
            },
        }
    }
}

/// TCP server running one readiness loop thread.
///
/// Owns the loop: dropping the `Server` stops it. Clone a [`ServerHandle`]
/// to send or kick from other threads.
pub struct Server {
    handle: ServerHandle,
}

impl Server {
    /// Server with default config and no lifecycle callbacks.
    pub fn new(registry: Registry<ServerHandle>) -> Self {
        Self::builder(registry).build()
    }

    pub fn builder(registry: Registry<ServerHandle>) -> ServerBuilder {
        ServerBuilder {
            config: ServerConfig::default(),
            registry,
            events: Arc::new(NoEvents),
            ids: random_ids(),
        }
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }
}

impl Deref for Server {
    type Target = ServerHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

/// Cloneable access to a running server.
///
/// Send operations encode the envelope once, queue the frame on each target
/// connection and wake the loop; they never block on socket I/O.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Bind `host:port` and start the readiness loop.
    ///
    /// Returns the bound address (useful with port 0).
    pub fn start(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let shared = &self.shared;
        let _guard = lock(&shared.lifecycle);
        if self.state() != ServerState::Stopped {
            return Err(PeerError::AlreadyRunning);
        }
        shared.set_state(ServerState::Starting);

        if let Some(previous) = lock(&shared.loop_thread).take() {
            let _ = previous.join();
        }

        match self.spawn_loop(host, port) {
            Ok(local_addr) => {
                info!(%local_addr, max_connections = shared.config.max_connections, "server started");
                Ok(local_addr)
            }
            Err(err) => {
                *lock(&shared.waker) = None;
                *lock(&shared.local_addr) = None;
                shared.set_state(ServerState::Stopped);
                Err(err)
            }
        }
    }

    fn spawn_loop(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let mut acceptor = TcpAcceptor::bind(host, port)?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut acceptor, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let local_addr = acceptor.local_addr();

        *lock(&self.shared.pending) = Pending::default();
        *lock(&self.shared.waker) = Some(waker);
        *lock(&self.shared.local_addr) = Some(local_addr);
        self.shared.set_state(ServerState::Running);

        let event_loop = EventLoop {
            poll,
            acceptor,
            slots: HashMap::new(),
            tokens: HashMap::new(),
            next_token: FIRST_CONNECTION,
            backlog: HashSet::new(),
            accept_retry: false,
            handle: self.clone(),
        };
        let join = thread::Builder::new()
            .name("netplay-server".to_string())
            .spawn(move || event_loop.run())?;
        *lock(&self.shared.loop_thread) = Some(join);
        Ok(local_addr)
    }

    /// Disconnect every connection, close the listener and wait for the loop.
    ///
    /// Idempotent. Called from a handler or callback (on the loop thread) it
    /// only requests the stop; the loop finishes it after the callback returns.
    pub fn stop(&self) {
        let join = {
            let _guard = lock(&self.shared.lifecycle);
            match self.state() {
                ServerState::Stopped => return,
                ServerState::Starting | ServerState::Running => {
                    self.shared.set_state(ServerState::Stopping);
                    lock(&self.shared.pending).stop = true;
                    self.wake();
                    info!("server stopping");
                }
                ServerState::Stopping => {}
            }
            let mut slot = lock(&self.shared.loop_thread);
            match slot.as_ref() {
                Some(join) if join.thread().id() == thread::current().id() => None,
                _ => slot.take(),
            }
        };

        if let Some(join) = join {
            if join.join().is_err() {
                error!("server loop panicked");
                self.shared.set_state(ServerState::Stopped);
            }
        }
    }

    /// Queue `envelope` on one connection. Returns false if the id is unknown
    /// or the connection no longer accepts frames.
    pub fn unicast(&self, id: &ConnectionId, envelope: &Envelope) -> Result<bool> {
        let frame = self.encode(envelope)?;
        let target = read(&self.shared.connections).get(id).cloned();
        match target {
            Some(conn) => Ok(self.queue_on([conn], frame) == 1),
            None => {
                debug!(connection = %id, type_id = envelope.type_id(), "unicast to unknown connection skipped");
                Ok(false)
            }
        }
    }

    /// Queue `envelope` on every listed connection present in the table.
    ///
    /// Returns how many connections it was queued on.
    pub fn multicast<'a, I>(&self, ids: I, envelope: &Envelope) -> Result<usize>
    where
        I: IntoIterator<Item = &'a ConnectionId>,
    {
        let frame = self.encode(envelope)?;
        let targets: Vec<_> = {
            let table = read(&self.shared.connections);
            ids.into_iter()
                .filter_map(|id| {
                    let conn = table.get(id).cloned();
                    if conn.is_none() {
                        debug!(connection = %id, "multicast to unknown connection skipped");
                    }
                    conn
                })
                .collect()
        };
        Ok(self.queue_on(targets, frame))
    }

    /// Queue `envelope` on every open connection.
    pub fn broadcast(&self, envelope: &Envelope) -> Result<usize> {
        self.broadcast_except(&[], envelope)
    }

    /// Queue `envelope` on every open connection not listed in `excluded`.
    pub fn broadcast_except(&self, excluded: &[ConnectionId], envelope: &Envelope) -> Result<usize> {
        let frame = self.encode(envelope)?;
        let targets: Vec<_> = read(&self.shared.connections)
            .values()
            .filter(|conn| !excluded.contains(&conn.info().id))
            .cloned()
            .collect();
        Ok(self.queue_on(targets, frame))
    }

    /// Remove a connection from the table and have the loop close it.
    ///
    /// Frames already queued are flushed best-effort before the socket is
    /// closed. Returns false if the id is unknown.
    pub fn kick(&self, id: &ConnectionId) -> bool {
        let Some(conn) = write(&self.shared.connections).remove(id) else {
            debug!(connection = %id, "kick of unknown connection ignored");
            return false;
        };
        conn.begin_close();
        lock(&self.shared.pending).kicks.push(id.clone());
        self.wake();
        info!(connection = %id, "connection kicked");
        true
    }

    fn encode(&self, envelope: &Envelope) -> Result<Bytes> {
        if self.state() != ServerState::Running {
            return Err(PeerError::NotRunning);
        }
        Ok(envelope.encode()?)
    }

    fn queue_on(&self, targets: impl IntoIterator<Item = Arc<ConnectionShared>>, frame: Bytes) -> usize {
        let queued: Vec<ConnectionId> = targets
            .into_iter()
            .filter(|conn| conn.enqueue(frame.clone()))
            .map(|conn| conn.info().id.clone())
            .collect();
        if !queued.is_empty() {
            lock(&self.shared.pending).writes.extend(queued.iter().cloned());
            self.wake();
        }
        queued.len()
    }

    fn wake(&self) {
        if let Some(waker) = lock(&self.shared.waker).as_ref() {
            if let Err(err) = waker.wake() {
                warn!(error = %err, "failed to wake server loop");
            }
        }
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &Registry<ServerHandle> {
        &self.shared.registry
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.shared.local_addr)
    }

    pub fn connection_count(&self) -> usize {
        read(&self.shared.connections).len()
    }

    pub fn max_connections(&self) -> usize {
        self.shared.config.max_connections
    }

    pub fn is_full(&self) -> bool {
        self.connection_count() >= self.max_connections()
    }

    /// Whether `id` is in the connection table (and so addressable).
    pub fn contains(&self, id: &ConnectionId) -> bool {
        read(&self.shared.connections).contains_key(id)
    }

    /// Ids currently in the table, sorted.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = read(&self.shared.connections).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn connection_info(&self, id: &ConnectionId) -> Option<ConnectionInfo> {
        read(&self.shared.connections)
            .get(id)
            .map(|conn| conn.info().clone())
    }
}

struct Slot {
    conn: Connection,
    writable: bool,
}

/// State owned by the loop thread.
struct EventLoop {
    poll: Poll,
    acceptor: TcpAcceptor,
    slots: HashMap<Token, Slot>,
    tokens: HashMap<ConnectionId, Token>,
    next_token: usize,
    /// Connections whose read budget ran out with data left in the socket.
    backlog: HashSet<Token>,
    accept_retry: bool,
    handle: ServerHandle,
}

impl EventLoop {
    fn run(mut self) {
        let mut events = Events::with_capacity(self.handle.shared.config.events_capacity.max(1));
        loop {
            let timeout = if !self.backlog.is_empty() {
                Some(Duration::ZERO)
            } else if self.accept_retry {
                Some(ACCEPT_RETRY_DELAY)
            } else {
                None
            };
            if let Err(err) = self.poll.poll(&mut events, timeout) {
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %err, "server poll failed");
                break;
            }

            let backlog = std::mem::take(&mut self.backlog);
            if std::mem::take(&mut self.accept_retry) {
                self.accept_all();
            }
            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_all(),
                    WAKER => {}
                    token => self.connection_event(token, event),
                }
            }
            for token in backlog {
                self.read_ready(token);
            }

            if self.process_pending() {
                break;
            }
        }
        self.shutdown();
    }

    fn accept_all(&mut self) {
        loop {
            let (stream, peer_addr) = match self.acceptor.accept() {
                Ok(Some(accepted)) => accepted,
                Ok(None) => return,
                Err(err) if err.is_per_connection() => {
                    debug!(error = %err, "incoming connection failed before accept");
                    continue;
                }
                Err(err) => {
                    // Edge-triggered: pending connections raise no new event.
                    warn!(error = %err, "accept failed, retrying");
                    self.accept_retry = true;
                    return;
                }
            };

            if self.handle.is_full() {
                warn!(
                    %peer_addr,
                    max_connections = self.handle.max_connections(),
                    "server full, rejecting connection"
                );
                drop(stream);
                continue;
            }
            self.admit(stream, peer_addr);
        }
    }

    fn admit(&mut self, stream: TcpStream, peer_addr: SocketAddr) {
        let Some(id) = self.fresh_id() else {
            warn!(%peer_addr, "no unused connection id available, rejecting connection");
            return;
        };
        let config = &self.handle.shared.config;
        let mut conn = Connection::with_limits(
            id.clone(),
            stream,
            peer_addr,
            config.read_chunk_size,
            config.max_queued_bytes,
        );

        let token = Token(self.next_token);
        self.next_token += 1;
        if let Err(err) = self
            .poll
            .registry()
            .register(conn.stream_mut(), token, Interest::READABLE)
        {
            warn!(%peer_addr, error = %err, "failed to register connection");
            return;
        }

        let info = conn.info().clone();
        write(&self.handle.shared.connections).insert(id.clone(), Arc::clone(conn.shared()));
        self.tokens.insert(id, token);
        self.slots.insert(
            token,
            Slot {
                conn,
                writable: false,
            },
        );

        info!(connection = %info.id, %peer_addr, "connection accepted");
        self.notify(|events, handle| events.on_user_connected(handle, &info));
    }

    fn fresh_id(&self) -> Option<ConnectionId> {
        let table = read(&self.handle.shared.connections);
        let id = (0..ID_ATTEMPTS)
            .map(|_| (self.handle.shared.ids)())
            .find(|id| !self.tokens.contains_key(id) && !table.contains_key(id));
        id
    }

    fn connection_event(&mut self, token: Token, event: &Event) {
        if event.is_readable() || event.is_read_closed() || event.is_error() {
            self.read_ready(token);
        }
        if event.is_writable() {
            self.flush(token);
        }
    }

    /// Read and dispatch at most [`READ_BUDGET_CHUNKS`] chunks. A connection
    /// with data left over goes on the backlog for the next pass.
    fn read_ready(&mut self, token: Token) {
        for _ in 0..READ_BUDGET_CHUNKS {
            if !self.read_chunk(token) {
                return;
            }
        }
        self.backlog.insert(token);
    }

    /// Returns whether the socket may hold more data.
    fn read_chunk(&mut self, token: Token) -> bool {
        let Some(slot) = self.slots.get_mut(&token) else {
            return false;
        };
        let sender = slot.conn.id().clone();
        let outcome = slot.conn.read_chunk();
        let more = outcome.as_ref().is_ok_and(|outcome| outcome.limited);

        let mut envelopes = Vec::new();
        let mut malformed = None;
        for frame in slot.conn.frames() {
            match frame {
                Ok(envelope) => envelopes.push(envelope),
                Err(err) => {
                    malformed = Some(err);
                    break;
                }
            }
        }

        for envelope in envelopes {
            // A handler may have kicked the sender; nothing more is delivered for it.
            if !self.handle.contains(&sender) {
                debug!(connection = %sender, "connection left the table, dropping buffered frames");
                break;
            }
            let incoming = Incoming::new(envelope, sender.clone());
            self.handle.shared.registry.dispatch(&self.handle, &incoming);
        }

        let reason = match (outcome, malformed) {
            (_, Some(err)) => {
                warn!(connection = %sender, error = %err, "malformed frame, closing connection");
                Some("malformed frame")
            }
            (Err(err), None) => {
                debug!(connection = %sender, error = %err, "read failed");
                Some("read error")
            }
            (Ok(outcome), None) if outcome.eof => Some("closed by peer"),
            _ => None,
        };
        if let Some(reason) = reason {
            self.disconnect(token, reason);
            return false;
        }
        more && self.handle.contains(&sender)
    }

    /// Drain a connection and keep WRITABLE interest only while data remains.
    fn flush(&mut self, token: Token) {
        let Some(slot) = self.slots.get_mut(&token) else {
            return;
        };
        let failure = match slot.conn.drain_writable() {
            Ok(remaining) if remaining == slot.writable => None,
            Ok(remaining) => {
                let interest = if remaining {
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                match self
                    .poll
                    .registry()
                    .reregister(slot.conn.stream_mut(), token, interest)
                {
                    Ok(()) => {
                        slot.writable = remaining;
                        None
                    }
                    Err(err) => Some(err),
                }
            }
            Err(err) => Some(err),
        };

        if let Some(err) = failure {
            debug!(error = %err, "write failed");
            self.disconnect(token, "write error");
        }
    }

    fn process_pending(&mut self) -> bool {
        let pending = std::mem::take(&mut *lock(&self.handle.shared.pending));

        for id in pending.kicks {
            if let Some(&token) = self.tokens.get(&id) {
                if let Some(slot) = self.slots.get_mut(&token) {
                    if let Err(err) = slot.conn.drain_writable() {
                        debug!(connection = %id, error = %err, "flush before kick failed");
                    }
                }
                self.close_slot(token, "kicked");
            }
        }
        for id in pending.writes {
            if let Some(&token) = self.tokens.get(&id) {
                self.flush(token);
            }
        }
        pending.stop
    }

    /// Table removal, then socket close, then the callback.
    fn disconnect(&mut self, token: Token, reason: &'static str) {
        let Some(slot) = self.slots.get(&token) else {
            return;
        };
        let shared = Arc::clone(slot.conn.shared());
        write(&self.handle.shared.connections).remove(&shared.info().id);
        shared.begin_close();
        self.close_slot(token, reason);
    }

    fn close_slot(&mut self, token: Token, reason: &'static str) {
        let Some(mut slot) = self.slots.remove(&token) else {
            return;
        };
        self.tokens.remove(slot.conn.id());
        self.backlog.remove(&token);
        if let Err(err) = self.poll.registry().deregister(slot.conn.stream_mut()) {
            debug!(connection = %slot.conn.id(), error = %err, "deregister failed");
        }
        slot.conn.close();

        let info = slot.conn.info().clone();
        info!(connection = %info.id, reason, "connection closed");
        self.notify(|events, handle| events.on_user_disconnected(handle, &info));
    }

    fn notify(&self, callback: impl FnOnce(&dyn ServerEvents, &ServerHandle)) {
        let events = self.handle.shared.events.as_ref();
        if catch_unwind(AssertUnwindSafe(|| callback(events, &self.handle))).is_err() {
            error!("server event callback panicked");
        }
    }

    fn shutdown(&mut self) {
        let tokens: Vec<Token> = self.slots.keys().copied().collect();
        for token in tokens {
            self.disconnect(token, "server stopping");
        }
        if let Err(err) = self.poll.registry().deregister(&mut self.acceptor) {
            debug!(error = %err, "listener deregister failed");
        }

        let shared = &self.handle.shared;
        *lock(&shared.waker) = None;
        *lock(&shared.local_addr) = None;
        *lock(&shared.pending) = Pending::default();
        shared.set_state(ServerState::Stopped);
        info!("server stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::time::{Duration, Instant};

    use super::*;

    fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
        let start = Instant::now();
        while !condition() {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn start_twice_fails() {
        let server = Server::new(Registry::new());
        server.start("127.0.0.1", 0).expect("server should start");
        assert!(matches!(
            server.start("127.0.0.1", 0),
            Err(PeerError::AlreadyRunning)
        ));
        assert!(server.is_running());
    }

    #[test]
    fn bind_failure_leaves_server_stopped() {
        let first = Server::new(Registry::new());
        let addr = first.start("127.0.0.1", 0).expect("server should start");

        let second = Server::new(Registry::new());
        assert!(matches!(
            second.start("127.0.0.1", addr.port()),
            Err(PeerError::Transport(_))
        ));
        assert_eq!(second.state(), ServerState::Stopped);
        assert!(second.local_addr().is_none());
    }

    #[test]
    fn stop_is_idempotent_and_restartable() {
        let server = Server::new(Registry::new());
        server.stop();
        server.start("127.0.0.1", 0).expect("server should start");
        server.stop();
        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);

        server.start("127.0.0.1", 0).expect("server should restart");
        assert!(server.is_running());
    }

    #[test]
    fn sends_require_running_server() {
        let server = Server::new(Registry::new());
        let envelope = Envelope::new(1, &b"x"[..]);
        assert!(matches!(server.broadcast(&envelope), Err(PeerError::NotRunning)));
    }

    #[test]
    fn unicast_reaches_connected_socket() {
        let server = Server::new(Registry::new());
        let addr = server.start("127.0.0.1", 0).expect("server should start");

        let mut client = std::net::TcpStream::connect(addr).expect("client should connect");
        wait_until("connection", || server.connection_count() == 1);
        let id = server.connection_ids().remove(0);
        assert_eq!(
            server.connection_info(&id).map(|info| info.peer_addr),
            client.local_addr().ok()
        );

        let envelope = Envelope::new(3, &b"hey"[..]);
        assert!(server.unicast(&id, &envelope).expect("unicast should queue"));
        assert!(!server
            .unicast(&ConnectionId::from("ghost"), &envelope)
            .expect("unknown id is not an error"));

        let mut wire = [0u8; 8];
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout should be settable");
        client.read_exact(&mut wire).expect("frame should arrive");
        assert_eq!(wire, [0x00, 0x06, 0x00, 0x00, 0x03, b'h', b'e', b'y']);
    }

    #[test]
    fn colliding_id_generator_rejects_second_connection() {
        let server = Server::builder(Registry::new())
            .id_generator(Arc::new(|| ConnectionId::from("same")))
            .build();
        let addr = server.start("127.0.0.1", 0).expect("server should start");

        let _first = std::net::TcpStream::connect(addr).expect("first client should connect");
        wait_until("first connection", || server.connection_count() == 1);

        let mut second = std::net::TcpStream::connect(addr).expect("second client should connect");
        second
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout should be settable");
        let mut buf = [0u8; 1];
        let read = second.read(&mut buf).unwrap_or(0);
        assert_eq!(read, 0, "rejected socket should be closed");
        assert_eq!(server.connection_count(), 1);
    }

    #[test]
    fn drop_stops_loop() {
        let addr = {
            let server = Server::new(Registry::new());
            server.start("127.0.0.1", 0).expect("server should start")
        };
        // Listener is gone once the server is dropped.
        let attempt = std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(500));
        if let Ok(mut stream) = attempt {
            let _ = stream.write_all(b"x");
            let mut buf = [0u8; 1];
            stream
                .set_read_timeout(Some(Duration::from_secs(2)))
                .expect("timeout should be settable");
            assert_eq!(stream.read(&mut buf).unwrap_or(0), 0);
        }
    }
}
