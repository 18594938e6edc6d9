use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use netplay_peer::{
    ConnectionInfo, Incoming, Registry, Server, ServerConfig, ServerEvents, ServerHandle,
};

use crate::cmd::{install_ctrlc_handler, ServeArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::OutputFormat;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Logs connects and disconnects.
struct RelayEvents;

impl ServerEvents for RelayEvents {
    fn on_user_connected(&self, server: &ServerHandle, connection: &ConnectionInfo) {
        tracing::info!(
            connection = %connection.id,
            peer_addr = %connection.peer_addr,
            connections = server.connection_count(),
            "user connected"
        );
    }

    fn on_user_disconnected(&self, server: &ServerHandle, connection: &ConnectionInfo) {
        tracing::info!(
            connection = %connection.id,
            peer_addr = %connection.peer_addr,
            connections = server.connection_count(),
            "user disconnected"
        );
    }
}

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    if args.max_connections == 0 {
        return Err(CliError::new(USAGE, "--max-connections must be at least 1"));
    }

    let registry = relay_registry(&args.types)?;
    let server = Server::builder(registry)
        .config(ServerConfig::default().with_max_connections(args.max_connections))
        .events(RelayEvents)
        .build();

    let running = install_ctrlc_handler()?;
    let local_addr = server
        .start(&args.endpoint.host, args.endpoint.port)
        .map_err(|err| peer_error("bind failed", err))?;
    // Scripts read the bound address from stderr when port 0 was requested.
    eprintln!("listening on {local_addr}");

    while running.load(Ordering::SeqCst) && server.is_running() {
        thread::sleep(SHUTDOWN_POLL);
    }
    server.stop();
    Ok(SUCCESS)
}

/// Every listed type is rebroadcast to all connections except its sender.
fn relay_registry(types: &[u16]) -> CliResult<Registry<ServerHandle>> {
    let mut registry = Registry::new();
    for &type_id in types {
        registry
            .register(type_id, move |server: &ServerHandle, msg: &Incoming| {
                let relayed = server.broadcast_except(
                    std::slice::from_ref(msg.sender()),
                    msg.envelope(),
                )?;
                tracing::debug!(type_id, sender = %msg.sender(), relayed, "relayed envelope");
                Ok(())
            })
            .map_err(|err| CliError::new(USAGE, format!("invalid --types: {err}")))?;
    }
    Ok(registry)
}
