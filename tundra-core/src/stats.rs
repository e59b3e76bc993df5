//! Packet counters and the periodic stats report (spec §2 "Stats &
//! logging", §4.8, §7). `original_source/packet.c`'s `pkt_print_stats`
//! reports the same counters twice — once for the local operator, once
//! pushed to the client as a `MESSAGE` payload — so `Stats` keeps both
//! the `tracing` event and the wire encoding in one place.

use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_compressed: u64,
    pub rx_dropped: u64,
    pub eth_rx_dns: u64,
    pub eth_rx_arp: u64,
    pub udp_rx_drop_addr_pkt: u64,
    pub udp_rx_drop_timestamp_pkt: u64,
    pub udp_rx_drop_blake2_pkt: u64,
    pub tx_errors: u64,
}

/// Wire size of [`Stats::encode`]'s `MESSAGE` payload: nine u64 fields.
/// `tx_errors` is a local-only counter (spec §7) and isn't part of the
/// wire payload the peer receives.
pub const MESSAGE_LEN: usize = 9 * 8;

impl Stats {
    pub fn record_tx(&mut self, compressed: bool) {
        self.tx_packets += 1;
        if compressed {
            self.tx_compressed += 1;
        }
    }

    pub fn record_rx(&mut self) {
        self.rx_packets += 1;
    }

    pub fn record_drop_addr(&mut self) {
        self.rx_dropped += 1;
        self.udp_rx_drop_addr_pkt += 1;
    }

    pub fn record_drop_timestamp(&mut self) {
        self.rx_dropped += 1;
        self.udp_rx_drop_timestamp_pkt += 1;
    }

    pub fn record_drop_mac(&mut self) {
        self.rx_dropped += 1;
        self.udp_rx_drop_blake2_pkt += 1;
    }

    pub fn record_drop_other(&mut self) {
        self.rx_dropped += 1;
    }

    pub fn record_dns(&mut self) {
        self.eth_rx_dns += 1;
    }

    pub fn record_arp(&mut self) {
        self.eth_rx_arp += 1;
    }

    /// A `send`/`send_to` call failed (spec §7: "counted and logged",
    /// never retried).
    pub fn record_send_error(&mut self) {
        self.tx_errors += 1;
    }

    /// Logs the current counters locally. Called every
    /// `STATS_TIMEOUT_MAX` ticks by both peers.
    pub fn log_local(&self) {
        info!(
            tx = self.tx_packets,
            rx = self.rx_packets,
            tx_compressed = self.tx_compressed,
            rx_dropped = self.rx_dropped,
            dns = self.eth_rx_dns,
            arp = self.eth_rx_arp,
            drop_addr = self.udp_rx_drop_addr_pkt,
            drop_timestamp = self.udp_rx_drop_timestamp_pkt,
            drop_mac = self.udp_rx_drop_blake2_pkt,
            tx_errors = self.tx_errors,
            "tunnel stats"
        );
    }

    /// Encodes the counters as a `MESSAGE` payload pushed from server to
    /// client (spec §2, §4.8).
    pub fn encode(&self) -> [u8; MESSAGE_LEN] {
        let mut out = [0u8; MESSAGE_LEN];
        let fields = [
            self.tx_packets,
            self.rx_packets,
            self.tx_compressed,
            self.rx_dropped,
            self.eth_rx_dns,
            self.eth_rx_arp,
            self.udp_rx_drop_addr_pkt,
            self.udp_rx_drop_timestamp_pkt,
            self.udp_rx_drop_blake2_pkt,
        ];
        for (i, field) in fields.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&field.to_be_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_as_expected() {
        let mut s = Stats::default();
        s.record_tx(false);
        s.record_tx(true);
        s.record_drop_mac();
        assert_eq!(s.tx_packets, 2);
        assert_eq!(s.tx_compressed, 1);
        assert_eq!(s.rx_dropped, 1);
        assert_eq!(s.udp_rx_drop_blake2_pkt, 1);
    }

    #[test]
    fn encode_is_stable_width() {
        let s = Stats::default();
        assert_eq!(s.encode().len(), MESSAGE_LEN);
    }
}
