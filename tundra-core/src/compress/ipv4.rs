//! Shared IPv4 header (de)composition used by both the L3 and L4 layers.
//!
//! The 20-byte IPv4 header is split into:
//! - a 25-byte **signature** (with the 14-byte Ethernet header prepended)
//!   of fields that stay constant for a given flow: version/IHL, DSCP,
//!   protocol, source and destination address. This is what gets cached
//!   and matched in the table.
//! - a 9-byte **variable** block (total length, identification,
//!   flags+fragment offset, TTL, checksum) that changes packet to packet.
//!   Spec §4.5 excludes these from the signature but requires them
//!   "restored... from the remaining on-wire bytes", so they are carried
//!   verbatim in the compressed frame rather than recomputed.
//!
//! Only option-less IPv4 headers (IHL == 5 words) are eligible for
//! compression; anything else is left to travel uncompressed.

use crate::frame::ETH_HEADER_LEN;

pub const SIGNATURE_LEN: usize = ETH_HEADER_LEN + 11; // eth + ver/ihl + tos + proto + src(4) + dst(4)
pub const VARIABLE_LEN: usize = 9; // total_len(2) + ident(2) + flags_frag(2) + ttl(1) + checksum(2)
pub const IP_HEADER_LEN: usize = 20;
pub const HEADER_SPAN: usize = ETH_HEADER_LEN + IP_HEADER_LEN; // 34

const OFF_VER_IHL: usize = ETH_HEADER_LEN;
const OFF_TOS: usize = ETH_HEADER_LEN + 1;
const OFF_TOTAL_LEN: usize = ETH_HEADER_LEN + 2;
const OFF_IDENT: usize = ETH_HEADER_LEN + 4;
const OFF_FLAGS_FRAG: usize = ETH_HEADER_LEN + 6;
const OFF_TTL: usize = ETH_HEADER_LEN + 8;
const OFF_PROTO: usize = ETH_HEADER_LEN + 9;
const OFF_CHECKSUM: usize = ETH_HEADER_LEN + 10;
const OFF_SRC: usize = ETH_HEADER_LEN + 12;
const OFF_DST: usize = ETH_HEADER_LEN + 16;

/// `Some(ihl * 4)` if `frame` carries an option-less IPv4 header
/// compression can handle, `None` otherwise (short frame or options
/// present).
pub fn eligible_header_len(frame: &[u8]) -> Option<usize> {
    if frame.len() < HEADER_SPAN {
        return None;
    }
    let ihl = (frame[OFF_VER_IHL] & 0x0F) as usize * 4;
    if ihl != IP_HEADER_LEN {
        return None;
    }
    Some(ihl)
}

/// The 25-byte signature: callers needing a longer (e.g. L4) signature
/// append further bytes after this.
pub fn extract_signature(frame: &[u8]) -> [u8; SIGNATURE_LEN] {
    let mut sig = [0u8; SIGNATURE_LEN];
    sig[0..ETH_HEADER_LEN].copy_from_slice(&frame[0..ETH_HEADER_LEN]);
    sig[ETH_HEADER_LEN] = frame[OFF_VER_IHL];
    sig[ETH_HEADER_LEN + 1] = frame[OFF_TOS];
    sig[ETH_HEADER_LEN + 2] = frame[OFF_PROTO];
    sig[ETH_HEADER_LEN + 3..ETH_HEADER_LEN + 7].copy_from_slice(&frame[OFF_SRC..OFF_SRC + 4]);
    sig[ETH_HEADER_LEN + 7..ETH_HEADER_LEN + 11].copy_from_slice(&frame[OFF_DST..OFF_DST + 4]);
    sig
}

pub fn extract_variable(frame: &[u8]) -> [u8; VARIABLE_LEN] {
    let mut v = [0u8; VARIABLE_LEN];
    v[0..2].copy_from_slice(&frame[OFF_TOTAL_LEN..OFF_TOTAL_LEN + 2]);
    v[2..4].copy_from_slice(&frame[OFF_IDENT..OFF_IDENT + 2]);
    v[4..6].copy_from_slice(&frame[OFF_FLAGS_FRAG..OFF_FLAGS_FRAG + 2]);
    v[6] = frame[OFF_TTL];
    v[7..9].copy_from_slice(&frame[OFF_CHECKSUM..OFF_CHECKSUM + 2]);
    v
}

/// Rebuilds the 34-byte eth+IPv4 header ending at absolute offset `pos`
/// (i.e. writing into `buf[pos - SIGNATURE_LEN .. pos + VARIABLE_LEN -
/// ETH_HEADER_LEN]`... in practice `buf[pos-25..pos+9)`, 34 bytes total),
/// from a cached 25-byte `signature` and the 9-byte `variable` block that
/// travelled on the wire at `buf[pos..pos+9)`. Returns the number of
/// genuinely new bytes prepended (`SIGNATURE_LEN`); the 9 variable bytes
/// were already counted in the caller's running length.
pub fn restore(signature: &[u8], variable: &[u8; VARIABLE_LEN], buf: &mut [u8], pos: usize) -> usize {
    debug_assert!(signature.len() >= SIGNATURE_LEN);
    debug_assert!(pos >= SIGNATURE_LEN);

    let eth_start = pos - SIGNATURE_LEN;
    let ip_start = eth_start + ETH_HEADER_LEN;

    buf[eth_start..eth_start + ETH_HEADER_LEN].copy_from_slice(&signature[0..ETH_HEADER_LEN]);
    buf[ip_start] = signature[ETH_HEADER_LEN]; // ver/ihl
    buf[ip_start + 1] = signature[ETH_HEADER_LEN + 1]; // tos
    buf[ip_start + 2..ip_start + 4].copy_from_slice(&variable[0..2]); // total length
    buf[ip_start + 4..ip_start + 6].copy_from_slice(&variable[2..4]); // identification
    buf[ip_start + 6..ip_start + 8].copy_from_slice(&variable[4..6]); // flags+frag
    buf[ip_start + 8] = variable[6]; // ttl
    buf[ip_start + 9] = signature[ETH_HEADER_LEN + 2]; // protocol
    buf[ip_start + 10..ip_start + 12].copy_from_slice(&variable[7..9]); // checksum
    buf[ip_start + 12..ip_start + 16].copy_from_slice(&signature[ETH_HEADER_LEN + 3..ETH_HEADER_LEN + 7]); // src
    buf[ip_start + 16..ip_start + 20].copy_from_slice(&signature[ETH_HEADER_LEN + 7..ETH_HEADER_LEN + 11]); // dst

    SIGNATURE_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Vec<u8> {
        let mut f = vec![0u8; HEADER_SPAN + 8];
        f[12] = 0x08;
        f[13] = 0x00; // ethertype IPv4
        f[OFF_VER_IHL] = 0x45;
        f[OFF_TOS] = 0x00;
        f[OFF_TOTAL_LEN..OFF_TOTAL_LEN + 2].copy_from_slice(&28u16.to_be_bytes());
        f[OFF_IDENT..OFF_IDENT + 2].copy_from_slice(&0x1234u16.to_be_bytes());
        f[OFF_FLAGS_FRAG..OFF_FLAGS_FRAG + 2].copy_from_slice(&0x4000u16.to_be_bytes());
        f[OFF_TTL] = 64;
        f[OFF_PROTO] = 17;
        f[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&0xBEEFu16.to_be_bytes());
        f[OFF_SRC..OFF_SRC + 4].copy_from_slice(&[10, 0, 0, 1]);
        f[OFF_DST..OFF_DST + 4].copy_from_slice(&[10, 0, 0, 2]);
        f
    }

    #[test]
    fn signature_and_variable_roundtrip_through_restore() {
        let frame = sample_frame();
        let sig = extract_signature(&frame);
        let var = extract_variable(&frame);

        let mut buf = vec![0u8; 128];
        let pos = 64;
        buf[pos..pos + VARIABLE_LEN].copy_from_slice(&var);
        let restored = restore(&sig, &var, &mut buf, pos);
        assert_eq!(restored, SIGNATURE_LEN);
        assert_eq!(&buf[pos - SIGNATURE_LEN..pos + VARIABLE_LEN], &frame[..HEADER_SPAN]);
    }

    #[test]
    fn options_present_is_ineligible() {
        let mut f = sample_frame();
        f[OFF_VER_IHL] = 0x46; // IHL = 6 words, options present
        assert!(eligible_header_len(&f).is_none());
    }
}
