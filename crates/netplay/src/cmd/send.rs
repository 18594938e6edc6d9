use std::fs;
use std::sync::mpsc;
use std::time::Duration;

use netplay_frame::{DeflateFilter, Envelope, Options, PayloadFilter};
use netplay_peer::{Client, ClientConfig, ClientHandle, ClientState, Incoming, Registry};

use crate::cmd::{parse_duration, Endpoint, SendArgs};
use crate::exit::{frame_error, peer_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_envelope, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.login.connect_timeout)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let credentials = args.login.credentials()?;
    let envelope = build_envelope(args.type_id, resolve_payload(&args)?, args.compress)?;

    let (replies, reply_rx) = mpsc::channel::<Incoming>();
    let mut registry = Registry::new();
    if args.wait {
        let reply_type = args.reply_type.unwrap_or(args.type_id);
        registry
            .register(reply_type, move |_: &ClientHandle, msg: &Incoming| {
                let _ = replies.send(msg.clone());
                Ok(())
            })
            .map_err(|err| peer_error("registry setup failed", err))?;
    }

    let client = Client::builder(registry)
        .config(ClientConfig::default().with_connect_timeout(connect_timeout))
        .build();
    connect(&client, &args.endpoint, credentials, connect_timeout)?;

    client
        .send(&envelope)
        .map_err(|err| peer_error("send failed", err))?;
    tracing::debug!(
        type_id = envelope.type_id(),
        options = %envelope.options(),
        wire_size = envelope.wire_size(),
        "envelope queued"
    );

    if args.wait {
        let reply = wait_for_reply(&reply_rx, wait_timeout)?;
        print_envelope(reply.envelope(), reply.sender().as_str(), format);
    }

    client.disconnect();
    Ok(SUCCESS)
}

/// Connect and block until established, mapping failures to exit codes.
pub fn connect(
    client: &Client,
    endpoint: &Endpoint,
    credentials: netplay_peer::Credentials,
    timeout: Duration,
) -> CliResult<()> {
    client
        .connect(&endpoint.host, endpoint.port, credentials)
        .map_err(|err| peer_error("connect failed", err))?;
    if client.wait_connected(timeout) {
        return Ok(());
    }
    let still_connecting = client.state() == ClientState::Connecting;
    client.disconnect();
    if still_connecting {
        Err(CliError::new(
            TIMEOUT,
            format!("connect to {endpoint} timed out"),
        ))
    } else {
        Err(CliError::new(FAILURE, format!("connect to {endpoint} failed")))
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

fn build_envelope(type_id: u16, payload: Vec<u8>, compress: bool) -> CliResult<Envelope> {
    if !compress {
        return Ok(Envelope::new(type_id, payload));
    }
    let packed = DeflateFilter::default()
        .compress(&payload)
        .map_err(|err| frame_error("compression failed", err))?;
    Ok(Envelope::with_options(type_id, Options::COMPRESSED, packed))
}

fn wait_for_reply(replies: &mpsc::Receiver<Incoming>, timeout: Duration) -> CliResult<Incoming> {
    replies.recv_timeout(timeout).map_err(|err| match err {
        mpsc::RecvTimeoutError::Timeout => CliError::new(
            TIMEOUT,
            format!("no reply within {}ms", timeout.as_millis()),
        ),
        mpsc::RecvTimeoutError::Disconnected => {
            CliError::new(USAGE, "reply handler was not registered")
        }
    })
}
