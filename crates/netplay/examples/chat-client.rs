//! Chat client: sends stdin lines, prints what others say.
//!
//! Run with:
//!   cargo run --example chat-client -- 127.0.0.1:7777 alice

use std::io::BufRead;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use netplay::codec::{to_envelope, FieldKind, NetworkRecord, Record, Schema};
use netplay::peer::{Client, ClientEvents, ClientHandle, ConnectionId, Credentials, Registry};

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

struct Status;

impl ClientEvents for Status {
    fn on_connected(&self, client: &ClientHandle) {
        if let Some(addr) = client.peer_addr() {
            eprintln!("connected to {addr}");
        }
    }

    fn on_disconnected(&self, _client: &ClientHandle) {
        eprintln!("disconnected");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:7777".to_string());
    let name = args.next().unwrap_or_else(|| "guest".to_string());
    let (host, port) = addr.rsplit_once(':').ok_or("expected HOST:PORT")?;

    let mut registry = Registry::new();
    registry.register_record(
        CHAT,
        |_: &ClientHandle, _sender: &ConnectionId, chat: Chat| {
            println!("{}: {}", chat.from, chat.text);
            Ok(())
        },
    )?;

    let client = Client::builder(registry).events(Status).build();
    client.connect(host, port.parse()?, Credentials::new(name.as_str(), "chat")?)?;
    if !client.wait_connected(Duration::from_secs(5)) {
        return Err("could not connect".into());
    }

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let chat = Chat {
            from: name.clone(),
            text: line,
        };
        client.send(&to_envelope(CHAT, &chat)?)?;
    }

    client.disconnect();
    Ok(())
}
