//! Chat room server: every chat line is relayed to everyone else.
//!
//! Run with:
//!   cargo run --example chat-server -- 127.0.0.1:7777
//!
//! Then start a few clients:
//!   cargo run --example chat-client -- 127.0.0.1:7777 alice

use std::sync::{Arc, OnceLock};

use netplay::codec::{to_compressed_envelope, FieldKind, NetworkRecord, Record, Schema};
use netplay::peer::{
    ConnectionId, ConnectionInfo, Registry, Server, ServerEvents, ServerHandle,
};

const CHAT: u16 = 1;

#[derive(Debug, Clone)]
struct Chat {
    from: String,
    text: String,
}

impl NetworkRecord for Chat {
    fn schema() -> Arc<Schema> {
        static SCHEMA: OnceLock<Arc<Schema>> = OnceLock::new();
        SCHEMA
            .get_or_init(|| {
                Arc::new(
                    Schema::builder("Chat")
                        .field(0, "from", FieldKind::Str)
                        .field(1, "text", FieldKind::Str)
                        .build()
                        .expect("chat schema is valid"),
                )
            })
            .clone()
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with(0, self.from.as_str())
            .with(1, self.text.as_str())
    }

    fn from_record(record: &Record) -> netplay::codec::Result<Self> {
        Ok(Self {
            from: record.require(0)?,
            text: record.require(1)?,
        })
    }
}

struct Lobby;

impl ServerEvents for Lobby {
    fn on_user_connected(&self, server: &ServerHandle, connection: &ConnectionInfo) {
        eprintln!("+ {} from {}", connection.id, connection.peer_addr);
        let welcome = Chat {
            from: "server".to_string(),
            text: format!("{} people here", server.connection_count()),
        };
        if let Ok(envelope) = to_compressed_envelope(CHAT, &welcome, server.registry().filter()) {
            let _ = server.unicast(&connection.id, &envelope);
        }
    }

    fn on_user_disconnected(&self, _server: &ServerHandle, connection: &ConnectionInfo) {
        eprintln!("- {}", connection.id);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7777".to_string());
    let (host, port) = addr.rsplit_once(':').ok_or("expected HOST:PORT")?;

    let mut registry = Registry::new();
    registry.register_record(
        CHAT,
        |server: &ServerHandle, sender: &ConnectionId, chat: Chat| {
            eprintln!("{}: {}", chat.from, chat.text);
            let envelope = to_compressed_envelope(CHAT, &chat, server.registry().filter())?;
            server.broadcast_except(std::slice::from_ref(sender), &envelope)?;
            Ok(())
        },
    )?;

    let server = Server::builder(registry).events(Lobby).build();
    let local_addr = server.start(host, port.parse()?)?;
    eprintln!("chat server on {local_addr}, Ctrl-C to quit");

    loop {
        std::thread::park();
    }
}
