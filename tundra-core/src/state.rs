//! Connection state machine (spec §3, §4.6). One `TunnelState` per
//! process; mutated only by the event loop (spec §5 — no locks needed).

use std::net::SocketAddr;

use tracing::info;

use crate::constants::CONNECT_TTL;
use crate::overlay::OverlayConfig;
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// What a timer tick just did, so the caller (the event loop) knows
/// whether a HELLO needs sending and whether compression tables need a
/// fresh reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    SendHello,
    SendHelloAndDisconnected,
}

/// What an inbound HELLO just did to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloOutcome {
    /// First handshake: tables must be reset, two HELLO replies sent.
    FirstHandshake,
    /// Already connected; TTL refreshed, no reply required beyond the
    /// normal periodic HELLO.
    TtlRefreshed,
}

pub struct TunnelState {
    pub role: Role,
    pub peer_addr: Option<SocketAddr>,
    pub state: ConnectionState,
    pub seq: u32,
    pub connect_ttl: i32,
    pub overlay: OverlayConfig,
    pub stats: Stats,
}

impl TunnelState {
    /// `fixed_peer` is `Some` for a client (its peer is configured, not
    /// learned) and `None` for a server (peer binds on first HELLO).
    pub fn new(role: Role, fixed_peer: Option<SocketAddr>) -> Self {
        Self {
            role,
            peer_addr: fixed_peer,
            state: ConnectionState::Disconnected,
            seq: 0,
            connect_ttl: 0,
            overlay: OverlayConfig::default(),
            stats: Stats::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Seq is incremented on every outbound packet and reset to 0 on
    /// each DISCONNECTED transition (spec §3, §8 property 5).
    pub fn next_seq(&mut self) -> u32 {
        self.seq += 1;
        self.seq
    }

    /// Handles an inbound HELLO that already passed framer validation.
    /// `source` is the packet's UDP source; for a server this becomes
    /// `peer_addr` on first handshake.
    pub fn on_hello(&mut self, source: SocketAddr) -> HelloOutcome {
        match self.state {
            ConnectionState::Disconnected => {
                self.seq = 0;
                if self.role == Role::Server {
                    self.peer_addr = Some(source);
                }
                self.state = ConnectionState::Connected;
                self.connect_ttl = CONNECT_TTL;
                info!(peer = ?self.peer_addr, "connected");
                HelloOutcome::FirstHandshake
            }
            ConnectionState::Connected => {
                self.connect_ttl = CONNECT_TTL;
                HelloOutcome::TtlRefreshed
            }
        }
    }

    /// Runs once per timer tick (spec §4.6, §4.8): decrements the TTL
    /// while CONNECTED and tears the session down at exactly zero —
    /// never negative, matching `child.c`'s select loop.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != ConnectionState::Connected {
            return TickOutcome::SendHello;
        }
        self.connect_ttl -= 1;
        if self.connect_ttl <= 0 {
            self.disconnect();
            return TickOutcome::SendHelloAndDisconnected;
        }
        TickOutcome::SendHello
    }

    /// Tears the session down: state, seq and (for a server) the bound
    /// peer address are all reset; compression tables are reset
    /// separately by the caller (spec §4.6 — both sides re-initialise
    /// on disconnect).
    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.seq = 0;
        self.connect_ttl = 0;
        if self.role == Role::Server {
            self.peer_addr = None;
        }
        info!("disconnected");
    }
}
