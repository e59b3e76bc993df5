//! L3 compression: caches the IPv4 invariant header fields (spec §4.5),
//! keyed per source/destination address pair and protocol. The 9-byte
//! variable block still travels on every compressed packet; see
//! [`super::ipv4`] for the exact split.

use super::ipv4;
use super::table::SignatureTable;

/// `Some(sid)` if this frame's IP-invariant signature has been seen
/// before, `None` if the header is ineligible (short frame, options
/// present) or being learned for the first time.
pub fn classify(table: &mut SignatureTable, frame: &[u8]) -> Option<u8> {
    ipv4::eligible_header_len(frame)?;
    let signature = ipv4::extract_signature(frame);
    table.classify(&signature)
}

/// Strips the 25-byte eth+IP invariant header, leaving the 9-byte
/// variable block in place at the front of what's transmitted. Returns
/// the number of bytes to skip from the front of `frame` before sending.
pub fn compress(frame: &[u8], out: &mut [u8]) -> usize {
    debug_assert!(frame.len() >= ipv4::HEADER_SPAN);
    let variable = ipv4::extract_variable(frame);
    out[..ipv4::VARIABLE_LEN].copy_from_slice(&variable);
    ipv4::SIGNATURE_LEN
}

/// Reconstructs the eth+IP header in front of `buf[pos..]`, where
/// `buf[pos..pos + VARIABLE_LEN]` already holds the on-wire variable
/// block. Returns the number of bytes restored, or `None` if the cached
/// template has been evicted or there isn't enough head-room.
pub fn decompress(table: &SignatureTable, buf: &mut [u8], pos: usize, sid: u8) -> Option<usize> {
    let template = table.template(sid)?;
    if pos < ipv4::SIGNATURE_LEN {
        return None;
    }
    let mut variable = [0u8; ipv4::VARIABLE_LEN];
    variable.copy_from_slice(&buf[pos..pos + ipv4::VARIABLE_LEN]);
    Some(ipv4::restore(template, &variable, buf, pos))
}
