use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::Duration;

use netplay_peer::{Client, ClientConfig, ClientHandle, Incoming, Registry};

use crate::cmd::send::connect;
use crate::cmd::{install_ctrlc_handler, parse_duration, ListenArgs};
use crate::exit::{CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_envelope, OutputFormat};

const RECV_POLL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.login.connect_timeout)?;
    let credentials = args.login.credentials()?;

    let (received, inbox) = mpsc::channel::<Incoming>();
    let registry = forwarding_registry(&args.types, received)?;
    let client = Client::builder(registry)
        .config(ClientConfig::default().with_connect_timeout(connect_timeout))
        .build();

    let running = install_ctrlc_handler()?;
    connect(&client, &args.endpoint, credentials, connect_timeout)?;
    tracing::info!(endpoint = %args.endpoint, types = ?args.types, "listening");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let incoming = match inbox.recv_timeout(RECV_POLL) {
            Ok(incoming) => incoming,
            Err(mpsc::RecvTimeoutError::Timeout) if client.is_connected() => continue,
            Err(_) => {
                return Err(CliError::new(
                    FAILURE,
                    format!("connection to {} closed", args.endpoint),
                ));
            }
        };

        print_envelope(incoming.envelope(), incoming.sender().as_str(), format);
        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    client.disconnect();
    Ok(SUCCESS)
}

/// Handlers for `types` that forward every envelope to the printing thread.
fn forwarding_registry(
    types: &[u16],
    received: mpsc::Sender<Incoming>,
) -> CliResult<Registry<ClientHandle>> {
    let mut registry = Registry::new();
    for &type_id in types {
        let received = received.clone();
        registry
            .register(type_id, move |_: &ClientHandle, msg: &Incoming| {
                let _ = received.send(msg.clone());
                Ok(())
            })
            .map_err(|err| CliError::new(USAGE, format!("invalid --types: {err}")))?;
    }
    Ok(registry)
}
