use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use netplay_peer::Credentials;

use crate::exit::{peer_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a relay server that rebroadcasts every frame to the other clients.
    Serve(ServeArgs),
    /// Connect, send a single envelope and optionally wait for a reply.
    Send(SendArgs),
    /// Connect and print received envelopes.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// `HOST:PORT` as given on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| format!("expected HOST:PORT, got {input:?}"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("missing host in {input:?}"));
        }
        let port = port
            .parse()
            .map_err(|_| format!("invalid port in {input:?}"))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Login flags shared by the client commands.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Username presented to the server.
    #[arg(long, env = "NETPLAY_USER", default_value = "netplay")]
    pub user: String,
    /// Password presented to the server.
    #[arg(long, env = "NETPLAY_PASSWORD", default_value = "netplay", hide_env_values = true)]
    pub password: String,
    /// How long to wait for the connection (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

impl LoginArgs {
    pub fn credentials(&self) -> CliResult<Credentials> {
        Credentials::new(self.user.as_str(), self.password.as_str())
            .map_err(|err| peer_error("invalid credentials", err))
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (port 0 picks a free port).
    pub endpoint: Endpoint,
    /// Maximum concurrent connections.
    #[arg(long, default_value = "64")]
    pub max_connections: usize,
    /// Message types to relay (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "1")]
    pub types: Vec<u16>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server to connect to.
    pub endpoint: Endpoint,
    /// Message type id.
    #[arg(long = "type", short = 't')]
    pub type_id: u16,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Compress the payload and set the compressed option bit.
    #[arg(long)]
    pub compress: bool,
    /// Wait for one reply envelope and print it.
    #[arg(long)]
    pub wait: bool,
    /// Message type of the reply (defaults to --type).
    #[arg(long)]
    pub reply_type: Option<u16>,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub login: LoginArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Server to connect to.
    pub endpoint: Endpoint,
    /// Message types to print (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "1")]
    pub types: Vec<u16>,
    /// Exit after receiving N envelopes.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub login: LoginArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Flag cleared on Ctrl-C.
pub fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}
