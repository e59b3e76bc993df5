//! The event loop (spec §4.8): single-threaded, cooperative, driven by
//! `tokio::select!` over the virtual interface, the UDP socket and a
//! periodic timer — the same shape as the teacher's
//! `tcp::handler::TcpHandler::run`, adapted from a per-connection accept
//! loop to a single always-on tunnel session.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, Interval};
use tracing::{debug, info, warn};

use crate::compress::{ipv4, l2, l3, l4, CompressionTables, Direction};
use crate::constants::{
    BUF_LEN, COMPRESS_TIMEOUT_MAX, CONNECT_RETRY_SECS, HEADER_LEN, MAC_LEN, MAX_FRAME, RESTORE_HEAD_ROOM,
    STATS_TIMEOUT_MAX, TIMEOUT_SECS,
};
use crate::error::SendError;
use crate::frame;
use crate::framer::{self, DropReason};
use crate::header::{Opcode, PacketHeader};
use crate::keys::KeyDictionary;
use crate::overlay::OverlayConfig;
use crate::state::{HelloOutcome, Role, TickOutcome, TunnelState};

/// A virtual Ethernet interface (TAP-style): one whole frame per
/// `recv`/`send` call. The concrete implementation (raw fd, `AsyncFd`,
/// ...) is an external collaborator's concern (spec §1); the engine only
/// needs this shape.
pub trait TapPort: Send + Sync {
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
    fn send(&self, buf: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// A bound UDP socket. `tokio::net::UdpSocket` already has this exact
/// shape (see the blanket impl below); tests substitute an in-memory
/// channel pair instead of a real socket.
pub trait UdpPort: Send + Sync {
    fn recv_from(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> impl Future<Output = io::Result<usize>> + Send;
}

impl UdpPort for tokio::net::UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        tokio::net::UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        tokio::net::UdpSocket::send_to(self, buf, target).await
    }
}

/// Where the client relays overlay changes (spec §4.9). A server never
/// observes an overlay change inbound, so it can use `std::io::Sink`.
pub trait ControlPort: Send + Sync {
    fn send(&mut self, msg: &[u8]) -> io::Result<()>;
}

impl ControlPort for std::io::Sink {
    fn send(&mut self, _msg: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// Caps how many drop logs of a given tick escape, so a flood of bad
/// packets can't spam the console (spec §7, "logging is rate limited by
/// reusing `logcnt`").
const DROP_LOG_BUDGET_PER_TICK: u32 = 1;

/// `self.rx_buf[..UDP_RECV_OFFSET]` is left empty on every receive so the
/// plaintext payload — which starts right after the header, at
/// `UDP_RECV_OFFSET + HEADER_LEN` — lands exactly at `RESTORE_HEAD_ROOM`,
/// matching every decompressor's head-room assumption.
const UDP_RECV_OFFSET: usize = RESTORE_HEAD_ROOM - HEADER_LEN;

pub struct Engine<T, U, C> {
    tap: T,
    udp: U,
    control: C,
    dict: KeyDictionary,
    state: TunnelState,
    tables: CompressionTables,
    ticks: u32,
    drop_logs_this_tick: u32,
    tap_buf: Vec<u8>,
    rx_buf: Vec<u8>,
    tx_buf: Vec<u8>,
}

impl<T, U, C> Engine<T, U, C>
where
    T: TapPort,
    U: UdpPort,
    C: ControlPort,
{
    pub fn new(
        role: Role,
        fixed_peer: Option<SocketAddr>,
        dict: KeyDictionary,
        tap: T,
        udp: U,
        control: C,
        table_capacity: usize,
    ) -> Self {
        Self {
            tap,
            udp,
            control,
            dict,
            state: TunnelState::new(role, fixed_peer),
            tables: CompressionTables::new(table_capacity),
            ticks: 0,
            drop_logs_this_tick: 0,
            tap_buf: vec![0u8; MAX_FRAME],
            rx_buf: vec![0u8; BUF_LEN],
            tx_buf: vec![0u8; RESTORE_HEAD_ROOM + MAX_FRAME + MAC_LEN + ipv4::VARIABLE_LEN],
        }
    }

    /// Sets the overlay configuration a server pushes to its client over
    /// HELLO (spec §4.9). A no-op for a client, which only ever receives
    /// one.
    pub fn set_overlay(&mut self, overlay: OverlayConfig) {
        self.state.overlay = overlay;
    }

    fn tick_period(&self) -> Duration {
        if self.state.role == Role::Client && !self.state.is_connected() {
            Duration::from_secs(CONNECT_RETRY_SECS)
        } else {
            Duration::from_secs(TIMEOUT_SECS)
        }
    }

    fn tick_interval(&self) -> Interval {
        let period = self.tick_period();
        let mut iv = interval(period);
        iv.reset_at(Instant::now() + period);
        iv
    }

    /// Runs until `shutdown` fires. Each iteration of the `select!`
    /// handles exactly one readiness event to completion before the
    /// next is considered (spec §4.8, §5 — no interleaving of
    /// compression-table mutations).
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) {
        if self.state.role == Role::Client {
            self.send_hello().await;
        }

        let mut timer = self.tick_interval();
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.drop_logs_this_tick = 0;
                    self.on_tick().await;
                    timer = self.tick_interval();
                }
                res = self.tap.recv(&mut self.tap_buf) => {
                    match res {
                        Ok(n) => self.handle_tap_frame(n).await,
                        Err(e) => warn!(error = %e, "tap read failed"),
                    }
                }
                res = self.udp.recv_from(&mut self.rx_buf[UDP_RECV_OFFSET..]) => {
                    match res {
                        Ok((n, source)) => self.handle_udp_datagram(n, source).await,
                        Err(e) => warn!(error = %e, "udp recv failed"),
                    }
                }
                res = shutdown.changed() => {
                    if res.is_ok() && *shutdown.borrow() {
                        info!("shutdown signal received, stopping tunnel loop");
                        break;
                    }
                }
            }
        }
    }

    async fn on_tick(&mut self) {
        self.ticks += 1;
        match self.state.tick() {
            TickOutcome::SendHello => self.send_hello().await,
            TickOutcome::SendHelloAndDisconnected => {
                self.tables.reset_all();
                self.send_hello().await;
            }
        }

        if self.state.role == Role::Server && self.state.is_connected() && self.ticks % STATS_TIMEOUT_MAX == 0 {
            self.state.stats.log_local();
            self.send_stats().await;
        }
        if self.ticks % COMPRESS_TIMEOUT_MAX == 0 {
            debug!(
                l2 = self.tables.l2_ref(Direction::Outbound).len(),
                l3 = self.tables.l3_ref(Direction::Outbound).len(),
                l4 = self.tables.l4_ref(Direction::Outbound).len(),
                "compression table occupancy"
            );
        }
    }

    async fn send_hello(&mut self) {
        let sync = !self.state.is_connected();
        self.send_hello_sync(sync).await;
    }

    /// Sends a HELLO with an explicit `F_SYNC` value rather than one
    /// derived from the current connection state. Needed for the
    /// server's double-HELLO reply on first handshake (spec §4.6):
    /// by the time that reply goes out, `TunnelState::on_hello` has
    /// already flipped the state to `Connected`, so `send_hello`'s own
    /// `!is_connected()` would wrongly compute `false` for both.
    async fn send_hello_sync(&mut self, sync: bool) {
        if self.state.role == Role::Server {
            let overlay = self.state.overlay.encode();
            self.send_control_opcode(Opcode::Hello, sync, &overlay).await;
        } else {
            self.send_control_opcode(Opcode::Hello, sync, &[]).await;
        }
    }

    async fn send_stats(&mut self) {
        let payload = self.state.stats.encode();
        self.send_control_opcode(Opcode::Message, false, &payload).await;
    }

    async fn send_control_opcode(&mut self, opcode: Opcode, sync: bool, payload: &[u8]) {
        let Some(peer) = self.state.peer_addr else {
            return;
        };
        let header_pos = RESTORE_HEAD_ROOM;
        let payload_start = header_pos + HEADER_LEN;
        self.tx_buf[payload_start..payload_start + payload.len()].copy_from_slice(payload);
        let seq = self.state.next_seq() as u16;
        let timestamp = now_secs();
        let total = framer::build_outbound(
            &self.dict,
            &mut self.tx_buf,
            header_pos,
            payload.len(),
            opcode,
            0,
            sync,
            seq,
            timestamp,
        );
        match self.udp.send_to(&self.tx_buf[header_pos..header_pos + total], peer).await {
            Ok(_) => self.state.stats.record_tx(false),
            Err(e) => self.record_send_error(SendError::Udp(e)),
        }
    }

    /// Frame read from the virtual interface: classify, compress, frame,
    /// send (spec §4.8's "virtual interface readable" branch, §4.5
    /// dispatch rules).
    async fn handle_tap_frame(&mut self, n: usize) {
        let Some(peer) = self.state.peer_addr else {
            return;
        };

        let header_pos = RESTORE_HEAD_ROOM;
        let payload_start = header_pos + HEADER_LEN;

        let (opcode, sid, payload_len, compressed) = {
            let frame = &self.tap_buf[..n];
            if frame::is_ipv6(frame) || frame::is_dns_aaaa_query(frame) {
                return;
            }

            if frame::is_dns(frame) {
                self.state.stats.record_dns();
                let (opcode, sid, stripped) = strip_l3(&mut self.tables, frame, &mut self.tx_buf[payload_start..]);
                let len = assemble_payload(&mut self.tx_buf, payload_start, opcode, frame, stripped);
                (opcode, sid, len, opcode == Opcode::DataCompressedL3)
            } else if frame::is_tcp(frame) || frame::is_udp(frame) {
                let (opcode, sid, stripped) = strip_l4(&mut self.tables, frame, &mut self.tx_buf[payload_start..]);
                let len = assemble_payload(&mut self.tx_buf, payload_start, opcode, frame, stripped);
                (opcode, sid, len, opcode == Opcode::DataCompressedL4)
            } else if frame::is_ip(frame) {
                let (opcode, sid, stripped) = strip_l3(&mut self.tables, frame, &mut self.tx_buf[payload_start..]);
                let len = assemble_payload(&mut self.tx_buf, payload_start, opcode, frame, stripped);
                (opcode, sid, len, opcode == Opcode::DataCompressedL3)
            } else {
                if frame::is_arp(frame) {
                    self.state.stats.record_arp();
                }
                let (opcode, sid, stripped) = strip_l2(&mut self.tables, frame);
                let len = assemble_payload(&mut self.tx_buf, payload_start, opcode, frame, stripped);
                (opcode, sid, len, opcode == Opcode::DataCompressedL2)
            }
        };

        let seq = self.state.next_seq() as u16;
        let timestamp = now_secs();
        let total = framer::build_outbound(
            &self.dict, &mut self.tx_buf, header_pos, payload_len, opcode, sid, false, seq, timestamp,
        );

        match self.udp.send_to(&self.tx_buf[header_pos..header_pos + total], peer).await {
            Ok(_) => self.state.stats.record_tx(compressed),
            Err(e) => self.record_send_error(SendError::Udp(e)),
        }
    }

    /// Datagram read from the UDP socket: validate, descramble,
    /// decompress, deliver (spec §4.8's "UDP readable" branch, §4.7
    /// dispatch).
    async fn handle_udp_datagram(&mut self, n: usize, source: SocketAddr) {
        self.state.stats.record_rx();
        let now = now_secs();
        let peer = self.state.peer_addr;

        let header = {
            let datagram = &mut self.rx_buf[UDP_RECV_OFFSET..UDP_RECV_OFFSET + n];
            match framer::validate_inbound(&self.dict, now, peer, source, datagram) {
                Ok((header, _payload)) => header,
                Err(reason) => {
                    self.record_drop(reason, source);
                    return;
                }
            }
        };

        if header.is_sync() {
            self.tables.reset_all();
        }

        match header.opcode {
            Opcode::Hello => self.on_hello(source).await,
            Opcode::Message => {} // client-side printing happens in the daemon, not the engine
            _ if header.opcode.is_data() => {
                let payload_len = n - HEADER_LEN - MAC_LEN;
                if let Some((start, len)) = self.restore_and_classify(header, payload_len) {
                    if let Err(e) = self.tap.send(&self.rx_buf[start..start + len]).await {
                        self.record_send_error(SendError::Tap(e));
                    }
                }
            }
            _ => {}
        }
    }

    async fn on_hello(&mut self, source: SocketAddr) {
        let outcome = self.state.on_hello(source);
        if outcome == HelloOutcome::FirstHandshake {
            self.tables.reset_all();
            if self.state.role == Role::Server {
                self.send_hello_sync(true).await;
                self.send_hello_sync(true).await;
            }
        } else if self.state.role == Role::Client {
            let overlay = OverlayConfig::decode(&self.rx_buf[RESTORE_HEAD_ROOM..]);
            if let Some(overlay) = overlay {
                if overlay != self.state.overlay {
                    self.state.overlay = overlay;
                    let _ = self.control.send(&overlay.control_message());
                }
            }
        }
    }

    /// Restores the original frame into `self.rx_buf` (a no-op for plain
    /// `Data`) and classifies it against the *inbound* table to keep that
    /// side warm (spec §4.5: "classify_* with sid = NULL to keep the
    /// receiver's table warm and consistent"). Returns the `(start, len)`
    /// bounds of the restored frame within `self.rx_buf`, or `None` if
    /// the opcode's cached template has been evicted (spec §4.5 tie-break
    /// — the sender's next packet for this sid arrives uncompressed).
    fn restore_and_classify(&mut self, header: PacketHeader, payload_len: usize) -> Option<(usize, usize)> {
        let dir = Direction::Inbound;
        let pos = RESTORE_HEAD_ROOM;

        let (frame_start, frame_len) = match header.opcode {
            Opcode::Data => (pos, payload_len),
            Opcode::DataCompressedL2 => {
                let restored = l2::decompress(self.tables.l2_ref(dir), &mut self.rx_buf, pos, header.sid)?;
                (pos - restored, restored + payload_len)
            }
            Opcode::DataCompressedL3 => {
                let restored = l3::decompress(self.tables.l3_ref(dir), &mut self.rx_buf, pos, header.sid)?;
                (pos - restored, restored + payload_len)
            }
            Opcode::DataCompressedL4 => {
                let restored = l4::decompress(self.tables.l4_ref(dir), &mut self.rx_buf, pos, header.sid)?;
                (pos - restored, restored + payload_len)
            }
            _ => return None,
        };

        let frame = &self.rx_buf[frame_start..frame_start + frame_len];
        if frame::is_dns(frame) {
            l3::classify(self.tables.l3(dir), frame);
        } else if frame::is_tcp(frame) || frame::is_udp(frame) {
            l4::classify(self.tables.l4(dir), frame);
        } else if frame::is_ip(frame) {
            l3::classify(self.tables.l3(dir), frame);
        } else {
            l2::classify(self.tables.l2(dir), frame);
        }

        Some((frame_start, frame_len))
    }

    fn record_send_error(&mut self, err: SendError) {
        self.state.stats.record_send_error();
        warn!(error = %err, "send failed");
    }

    fn record_drop(&mut self, reason: DropReason, source: SocketAddr) {
        match reason {
            DropReason::AddressMismatch => self.state.stats.record_drop_addr(),
            DropReason::TimestampDrift => self.state.stats.record_drop_timestamp(),
            DropReason::MacMismatch => self.state.stats.record_drop_mac(),
            _ => self.state.stats.record_drop_other(),
        }
        if self.drop_logs_this_tick < DROP_LOG_BUDGET_PER_TICK {
            self.drop_logs_this_tick += 1;
            warn!(?reason, %source, "dropped inbound packet");
        }
    }
}

/// Extracts the eth+IP invariant header signature, the IPv4-over-Ethernet
/// dispatch path (spec §4.5).
fn strip_l2(tables: &mut CompressionTables, frame: &[u8]) -> (Opcode, u8, usize) {
    match l2::classify(tables.l2(Direction::Outbound), frame) {
        Some(sid) => (Opcode::DataCompressedL2, sid, l2::compress(frame.len())),
        None => (Opcode::Data, 0, 0),
    }
}

fn strip_l3(tables: &mut CompressionTables, frame: &[u8], out: &mut [u8]) -> (Opcode, u8, usize) {
    match l3::classify(tables.l3(Direction::Outbound), frame) {
        Some(sid) => (Opcode::DataCompressedL3, sid, l3::compress(frame, out)),
        None => (Opcode::Data, 0, 0),
    }
}

fn strip_l4(tables: &mut CompressionTables, frame: &[u8], out: &mut [u8]) -> (Opcode, u8, usize) {
    match l4::classify(tables.l4(Direction::Outbound), frame) {
        Some(sid) => (Opcode::DataCompressedL4, sid, l4::compress(frame, out)),
        None => (Opcode::Data, 0, 0),
    }
}

/// Lays out the outbound payload at `tx_buf[payload_start..]` and
/// returns its length. For L3/L4 the 9-byte variable block was already
/// written into `tx_buf[payload_start..payload_start+9]` by
/// `strip_l3`/`strip_l4`; the untouched remainder of the frame follows
/// it. For L2 and plain `Data`, the frame's remainder is the whole
/// payload.
fn assemble_payload(tx_buf: &mut [u8], payload_start: usize, opcode: Opcode, frame: &[u8], stripped: usize) -> usize {
    let rest = &frame[stripped..];
    match opcode {
        Opcode::DataCompressedL3 | Opcode::DataCompressedL4 => {
            let rest_start = payload_start + ipv4::VARIABLE_LEN;
            tx_buf[rest_start..rest_start + rest.len()].copy_from_slice(rest);
            ipv4::VARIABLE_LEN + rest.len()
        }
        _ => {
            tx_buf[payload_start..payload_start + rest.len()].copy_from_slice(rest);
            rest.len()
        }
    }
}

fn now_secs() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
