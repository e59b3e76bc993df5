//! Overlay network configuration (spec §3, §4.6, §4.9): the seven
//! parameters the server pushes to the client over HELLO, and the
//! message the client relays to an external collaborator that applies
//! them to the operating system.

/// On-wire size of an encoded overlay: seven big-endian u32 fields.
pub const WIRE_LEN: usize = 7 * 4;

/// The control-socket message's literal prefix (spec §4.9, §6).
pub const CONTROL_PREFIX: &[u8] = b"config ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayConfig {
    pub netaddr: u32,
    pub netmask: u32,
    pub defaultgw: u32,
    pub mtu: u32,
    pub dns1: u32,
    pub dns2: u32,
    pub dns3: u32,
}

impl OverlayConfig {
    fn fields(&self) -> [u32; 7] {
        [self.netaddr, self.netmask, self.defaultgw, self.mtu, self.dns1, self.dns2, self.dns3]
    }

    fn from_fields(f: [u32; 7]) -> Self {
        Self { netaddr: f[0], netmask: f[1], defaultgw: f[2], mtu: f[3], dns1: f[4], dns2: f[5], dns3: f[6] }
    }

    /// Encodes the overlay as it travels inside a HELLO payload: seven
    /// big-endian u32 fields, scrambled like any other payload bytes.
    pub fn encode(&self) -> [u8; WIRE_LEN] {
        let mut out = [0u8; WIRE_LEN];
        for (i, field) in self.fields().iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&field.to_be_bytes());
        }
        out
    }

    /// Decodes a HELLO payload's overlay block. `None` if `buf` is
    /// shorter than `WIRE_LEN`.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < WIRE_LEN {
            return None;
        }
        let mut f = [0u32; 7];
        for (i, slot) in f.iter_mut().enumerate() {
            *slot = u32::from_be_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
        }
        Some(Self::from_fields(f))
    }

    /// Builds the control-socket message (spec §4.9): the literal
    /// `"config "` prefix followed by the seven fields in host byte
    /// order — deliberately *not* the wire's big-endian encoding, since
    /// the external collaborator reading this socket runs on the same
    /// host and expects native-order integers.
    pub fn control_message(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CONTROL_PREFIX.len() + WIRE_LEN);
        out.extend_from_slice(CONTROL_PREFIX);
        for field in self.fields() {
            out.extend_from_slice(&field.to_ne_bytes());
        }
        out
    }
}
