use std::io::{self, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs};

use mio::event::Source;
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Resolve a host/port pair to the first matching socket address.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addr = format!("{host}:{port}");
    if host.trim().is_empty() {
        return Err(TransportError::Resolve {
            addr,
            reason: "host must not be empty".to_string(),
        });
    }

    let mut candidates = (host, port)
        .to_socket_addrs()
        .map_err(|err| TransportError::Resolve {
            addr: addr.clone(),
            reason: err.to_string(),
        })?;

    candidates.next().ok_or_else(|| TransportError::Resolve {
        addr,
        reason: "no addresses found".to_string(),
    })
}

/// Listening TCP socket in non-blocking mode.
///
/// Registered with a `mio::Poll` by the server loop; `accept` never blocks and
/// returns `Ok(None)` once the OS accept queue is empty.
pub struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpAcceptor {
    /// Bind and listen on `host:port`. Port 0 picks an ephemeral port.
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = resolve(host, port)?;
        Self::bind_addr(addr)
    }

    /// Bind and listen on an already resolved address.
    pub fn bind_addr(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        info!(%local_addr, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept one pending connection, if any.
    pub fn accept(&self) -> Result<Option<(TcpStream, SocketAddr)>> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!(%peer_addr, error = %err, "failed to set TCP_NODELAY");
                    }
                    debug!(%peer_addr, "accepted connection");
                    return Ok(Some((stream, peer_addr)));
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl Source for TcpAcceptor {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.listener.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.listener.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.listener.deregister(registry)
    }
}

/// Start a non-blocking connect to `host:port`.
///
/// The returned stream is usually still connecting; register it for writable
/// readiness and call [`finish_connect`] when the event fires.
pub fn connect(host: &str, port: u16) -> Result<(TcpStream, SocketAddr)> {
    let addr = resolve(host, port)?;
    let stream = TcpStream::connect(addr).map_err(|source| TransportError::Connect {
        addr: addr.to_string(),
        source,
    })?;
    if let Err(err) = stream.set_nodelay(true) {
        debug!(%addr, error = %err, "failed to set TCP_NODELAY");
    }
    debug!(%addr, "connect started");
    Ok((stream, addr))
}

/// Check whether a non-blocking connect has completed.
///
/// Returns `Ok(true)` once established, `Ok(false)` while still in progress,
/// and the socket error if the connect failed.
pub fn finish_connect(stream: &TcpStream) -> io::Result<bool> {
    if let Some(err) = stream.take_error()? {
        return Err(err);
    }
    match stream.peer_addr() {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotConnected => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::time::{Duration, Instant};

    use super::*;

    fn accept_within(acceptor: &TcpAcceptor, timeout: Duration) -> (TcpStream, SocketAddr) {
        let start = Instant::now();
        loop {
            if let Some(accepted) = acceptor.accept().unwrap() {
                return accepted;
            }
            assert!(start.elapsed() < timeout, "no connection accepted in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_bind_accept_connect() {
        let acceptor = TcpAcceptor::bind("127.0.0.1", 0).unwrap();
        assert_ne!(acceptor.local_addr().port(), 0);

        let addr = acceptor.local_addr();
        let handle = std::thread::spawn(move || {
            let mut client = std::net::TcpStream::connect(addr).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let (mut server, _peer) = accept_within(&acceptor, Duration::from_secs(3));
        handle.join().unwrap();

        let mut buf = [0u8; 5];
        let start = Instant::now();
        let mut filled = 0;
        while filled < buf.len() {
            match server.read(&mut buf[filled..]) {
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    assert!(start.elapsed() < Duration::from_secs(3));
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(err) => panic!("read failed: {err}"),
            }
        }
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_accept_without_pending_returns_none() {
        let acceptor = TcpAcceptor::bind("127.0.0.1", 0).unwrap();
        assert!(acceptor.accept().unwrap().is_none());
    }

    #[test]
    fn test_resolve_rejects_empty_host() {
        let result = resolve("", 7000);
        assert!(matches!(result, Err(TransportError::Resolve { .. })));
    }

    #[test]
    fn test_resolve_ip_literal() {
        let addr = resolve("127.0.0.1", 7000).unwrap();
        assert_eq!(addr, "127.0.0.1:7000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_bind_twice_on_same_port_fails() {
        let first = TcpAcceptor::bind("127.0.0.1", 0).unwrap();
        let result = TcpAcceptor::bind_addr(first.local_addr());
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[test]
    fn test_nonblocking_connect_completes() {
        let acceptor = TcpAcceptor::bind("127.0.0.1", 0).unwrap();
        let port = acceptor.local_addr().port();

        let (stream, addr) = connect("127.0.0.1", port).unwrap();
        assert_eq!(addr.port(), port);

        let start = Instant::now();
        loop {
            match finish_connect(&stream) {
                Ok(true) => break,
                Ok(false) => {
                    assert!(start.elapsed() < Duration::from_secs(3));
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(err) => panic!("connect failed: {err}"),
            }
        }
        let _ = accept_within(&acceptor, Duration::from_secs(3));
    }
}
