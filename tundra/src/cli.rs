use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Default path for the keying secret when `--secret-file` is omitted
/// (spec §6: "path is fixed by configuration").
const DEFAULT_SECRET_FILE: &str = "/etc/tundra/secret";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Server,
    Client,
}

/// Point-to-point Ethernet-over-UDP tunnel daemon.
#[derive(Parser, Debug)]
#[command(author, version, about = "tundra tunnel daemon")]
pub struct Cli {
    /// Whether this process is the tunnel's server or client end.
    #[arg(long, value_enum)]
    pub role: RoleArg,

    /// Peer's UDP endpoint. Required for the client, which initiates the
    /// handshake; a server instead learns its peer from the first HELLO.
    #[arg(long)]
    pub peer: Option<SocketAddr>,

    /// Local UDP port to bind.
    #[arg(long)]
    pub port: u16,

    /// File descriptor number of an already-open, already-configured TAP
    /// device (spec §6: interface creation is an environmental service —
    /// this daemon only consumes the descriptor handed to it).
    #[arg(long)]
    pub tap_fd: i32,

    /// Path to the shared keying secret.
    #[arg(long, default_value = DEFAULT_SECRET_FILE)]
    pub secret_file: PathBuf,

    /// Unix domain socket the client writes overlay config changes to
    /// (spec §4.9, §6). Ignored by a server.
    #[arg(long)]
    pub control_socket: Option<PathBuf>,

    /// Number of session-id slots per compression layer/direction.
    #[arg(long, default_value_t = tundra_core::constants::COMPRESS_TABLE_SIZE)]
    pub table_capacity: usize,

    /// Enable verbose (debug-level) logging.
    #[arg(long)]
    pub debug: bool,

    /// Enable debug-level logging scoped to the compression engine only.
    #[arg(long)]
    pub debug_compress: bool,
}
