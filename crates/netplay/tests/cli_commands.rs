#![cfg(feature = "cli")]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use netplay_frame::{Envelope, FrameDecoder};

struct ServeProcess {
    child: Child,
    addr: SocketAddr,
}

impl Drop for ServeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("bind should succeed")
        .local_addr()
        .expect("listener should have an address")
        .port()
}

fn spawn_serve(extra: &[&str]) -> ServeProcess {
    let port = free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_netplay"))
        .args(["--log-level", "error", "serve"])
        .arg(format!("127.0.0.1:{port}"))
        .args(extra)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start");
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();

    let start = Instant::now();
    loop {
        if TcpStream::connect(addr).is_ok() {
            break;
        }
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "serve did not start listening"
        );
        thread::sleep(Duration::from_millis(25));
    }
    ServeProcess { child, addr }
}

fn dial(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("client should connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout should be settable");
    stream
}

fn read_one(stream: &mut TcpStream) -> Envelope {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 1024];
    loop {
        if let Some(envelope) = decoder.next_frame().expect("frame should be valid") {
            return envelope;
        }
        let read = stream.read(&mut buf).expect("frame bytes should arrive");
        assert!(read > 0, "connection closed before a frame arrived");
        decoder.extend(&buf[..read]);
    }
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_netplay"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("netplay {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn serve_relays_to_everyone_but_the_sender() {
    let serve = spawn_serve(&["--types", "1,2"]);
    let mut alice = dial(serve.addr);
    let mut bob = dial(serve.addr);
    thread::sleep(Duration::from_millis(200));

    let wire = Envelope::new(2, &b"hello bob"[..])
        .encode()
        .expect("frame should encode");
    alice.write_all(&wire).expect("alice write should succeed");

    let relayed = read_one(&mut bob);
    assert_eq!(relayed.type_id(), 2);
    assert_eq!(relayed.payload().as_ref(), b"hello bob");

    alice
        .set_read_timeout(Some(Duration::from_millis(200)))
        .expect("timeout should be settable");
    let mut buf = [0u8; 8];
    assert!(alice.read(&mut buf).is_err(), "sender must not get its own frame");
}

#[test]
fn send_delivers_compressed_envelope() {
    let serve = spawn_serve(&[]);
    let mut watcher = dial(serve.addr);
    thread::sleep(Duration::from_millis(200));

    let status = Command::new(env!("CARGO_BIN_EXE_netplay"))
        .args(["--log-level", "error", "send"])
        .arg(serve.addr.to_string())
        .args(["--type", "1", "--data", "ping ping ping ping", "--compress"])
        .status()
        .expect("send should run");
    assert!(status.success());

    let relayed = read_one(&mut watcher);
    assert_eq!(relayed.type_id(), 1);
    assert!(relayed.options().is_compressed());
    assert_ne!(relayed.payload().as_ref(), b"ping ping ping ping");
}

#[test]
fn listen_prints_json_and_exits_after_count() {
    let serve = spawn_serve(&[]);
    let listen = Command::new(env!("CARGO_BIN_EXE_netplay"))
        .args(["--log-level", "error", "--format", "json", "listen"])
        .arg(serve.addr.to_string())
        .args(["--count", "1"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen should start");
    thread::sleep(Duration::from_millis(500));

    let mut sender = dial(serve.addr);
    let wire = Envelope::new(1, &b"for the listener"[..])
        .encode()
        .expect("frame should encode");
    sender.write_all(&wire).expect("sender write should succeed");

    let output = listen.wait_with_output().expect("listen should exit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("output should be one json object");
    assert_eq!(line["type_id"], 1);
    assert_eq!(line["payload"], "for the listener");
    assert_eq!(line["sender"], "SERVER");
}

#[test]
fn send_to_closed_port_fails() {
    let port = free_port();
    let output = Command::new(env!("CARGO_BIN_EXE_netplay"))
        .args(["--log-level", "error", "send"])
        .arg(format!("127.0.0.1:{port}"))
        .args(["--type", "1", "--data", "x", "--connect-timeout", "2s"])
        .output()
        .expect("send should run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: connect"));
}
