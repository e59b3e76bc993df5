mod cli;
mod control;
mod tap;

use std::net::SocketAddr;

use clap::Parser;
use socket2::{Domain, Socket, Type};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, RoleArg};
use control::ControlChannel;
use tap::Tap;
use tundra_core::{Engine, KeyDictionary, Role};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if cli.role == RoleArg::Client && cli.peer.is_none() {
        error!("--peer is required when --role client");
        std::process::exit(1);
    }

    match run(cli).await {
        Ok(()) => {}
        Err(err) => {
            error!(%err, "tunnel exited with error");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> std::io::Result<()> {
    let secret = tokio::fs::read(&cli.secret_file).await.map_err(|e| {
        error!(path = %cli.secret_file.display(), error = %e, "failed to read secret file");
        e
    })?;
    if secret.is_empty() {
        error!(path = %cli.secret_file.display(), "secret file is empty");
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "empty secret file"));
    }

    let dict = KeyDictionary::derive(&secret, cli.port).map_err(|e| {
        error!(error = %e, "key derivation failed");
        std::io::Error::other(e.to_string())
    })?;

    let udp = bind_udp(cli.port, cli.peer)?;

    let tap = Tap::from_raw_fd(cli.tap_fd).map_err(|e| {
        error!(fd = cli.tap_fd, error = %e, "failed to attach tap descriptor");
        e
    })?;

    let role = match cli.role {
        RoleArg::Server => Role::Server,
        RoleArg::Client => Role::Client,
    };
    let fixed_peer = if role == Role::Client { cli.peer } else { None };

    let control = match (role, &cli.control_socket) {
        (Role::Client, Some(path)) => {
            ControlChannel::Unix(control::UnixControl::connect(path).map_err(|e| {
                error!(path = %path.display(), error = %e, "failed to connect control socket");
                e
            })?)
        }
        _ => ControlChannel::Sink(std::io::sink()),
    };

    info!(?role, port = cli.port, peer = ?cli.peer, "tunnel starting");

    let mut engine = Engine::new(role, fixed_peer, dict, tap, udp, control, cli.table_capacity);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    engine.run(&mut shutdown_rx).await;
    Ok(())
}

/// Binds the UDP socket the daemon will use, matching the peer's address
/// family when one is known (client) and falling back to IPv4 otherwise
/// (server, which learns its peer on first HELLO).
fn bind_udp(port: u16, peer: Option<SocketAddr>) -> std::io::Result<tokio::net::UdpSocket> {
    let v6 = peer.map(|p| p.is_ipv6()).unwrap_or(false);
    let bind_addr: SocketAddr =
        if v6 { format!("[::]:{port}").parse().unwrap() } else { format!("0.0.0.0:{port}").parse().unwrap() };

    let domain = if v6 { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&bind_addr.into())?;

    let std_socket: std::net::UdpSocket = socket.into();
    tokio::net::UdpSocket::from_std(std_socket)
}

fn init_tracing(cli: &Cli) {
    let default = if cli.debug {
        "debug"
    } else if cli.debug_compress {
        "info,tundra_core::engine=debug,tundra_core::compress=debug"
    } else {
        "info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();
}
