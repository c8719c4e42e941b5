use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an echo server.
    Serve(ServeArgs),
    /// Accept streams and print every message received.
    Listen(ListenArgs),
    /// Open streams to a server and send a payload on each.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format).await,
        Command::Listen(args) => listen::run(args, format).await,
        Command::Send(args) => send::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (e.g. 127.0.0.1:8080).
    pub bind: String,
    /// Paths to serve; a trailing `/` serves the whole subtree. Default: `/`.
    #[arg(long = "path", value_name = "PATH")]
    pub paths: Vec<String>,
    /// PEM certificate chain; serves wss:// when set.
    #[arg(long, value_name = "FILE", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,
    /// PEM private key for --tls-cert.
    #[arg(long, value_name = "FILE", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
    /// Messages buffered per stream before new ones are dropped.
    #[arg(long, default_value_t = wsmux_tunnel::DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (e.g. 127.0.0.1:8080).
    pub bind: String,
    /// Path to accept streams on; a trailing `/` accepts the whole subtree.
    #[arg(long, default_value = "/")]
    pub path: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server URL (e.g. ws://127.0.0.1:8080/echo).
    pub url: String,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Number of streams to open; the payload is sent on each.
    #[arg(long, default_value_t = 1)]
    pub streams: usize,
    /// Wait for one reply per stream and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for each reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
