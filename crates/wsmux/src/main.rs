mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::exit::{CliError, INTERNAL};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "wsmux", version, about = "WebSocket stream multiplexing CLI")]
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

    /// Extra filter directives (e.g. `wsmux_tunnel=trace`).
    #[arg(long, value_name = "DIRECTIVES", global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level, cli.log_filter.as_deref());

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
        .and_then(|runtime| runtime.block_on(cmd::run(cli.command, format)));

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
            "wsmux",
            "send",
            "ws://127.0.0.1:8080/echo",
            "--data",
            "hello",
            "--streams",
            "3",
            "--wait",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.streams, 3);
        assert!(args.wait);
        assert_eq!(args.wait_timeout, "5s");
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "wsmux",
            "send",
            "ws://127.0.0.1:8080/",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_serve_with_paths() {
        let cli = Cli::try_parse_from([
            "wsmux",
            "serve",
            "127.0.0.1:0",
            "--path",
            "/echo",
            "--path",
            "/api/",
            "--log-level",
            "debug",
        ])
        .expect("serve args should parse");

        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.paths, vec!["/echo", "/api/"]);
        assert_eq!(args.queue_capacity, wsmux_tunnel::DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn tls_cert_requires_key() {
        let err = Cli::try_parse_from(["wsmux", "serve", "127.0.0.1:0", "--tls-cert", "cert.pem"])
            .expect_err("cert without key should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
