mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "netplay", version, about = "netplay relay server and client CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "netplay",
            "send",
            "127.0.0.1:7777",
            "--type",
            "3",
            "--data",
            "hello",
            "--compress",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send command");
        };
        assert_eq!(args.endpoint.port, 7777);
        assert_eq!(args.type_id, 3);
        assert!(args.compress);
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "netplay",
            "send",
            "127.0.0.1:7777",
            "--type",
            "1",
            "--file",
            "payload.bin",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "netplay",
            "serve",
            "0.0.0.0:9000",
            "--max-connections",
            "8",
            "--types",
            "1,2,5",
        ])
        .expect("serve args should parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(args.max_connections, 8);
        assert_eq!(args.types, vec![1, 2, 5]);
    }

    #[test]
    fn rejects_endpoint_without_port() {
        let err = Cli::try_parse_from(["netplay", "listen", "localhost"])
            .expect_err("endpoint without port should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
