//! L2 compression: the whole 14-byte Ethernet header is the signature.
//! Ethernet carries no per-packet-varying fields worth preserving
//! separately, so there is no "variable block" here unlike L3/L4 — an
//! exact miss on any byte (e.g. a different peer MAC) is just a fresh
//! learn.

use super::table::SignatureTable;
use crate::frame::ETH_HEADER_LEN;

/// Returns `Some(sid)` if this frame's Ethernet header has been seen
/// before (compressible), `None` on first sighting (send verbatim).
pub fn classify(table: &mut SignatureTable, frame: &[u8]) -> Option<u8> {
    if frame.len() < ETH_HEADER_LEN {
        return None;
    }
    table.classify(&frame[..ETH_HEADER_LEN])
}

/// Strips the Ethernet header from the front of `frame`. Always succeeds
/// when `frame.len() >= ETH_HEADER_LEN`, which `classify` already checked.
pub fn compress(frame_len: usize) -> usize {
    debug_assert!(frame_len >= ETH_HEADER_LEN);
    ETH_HEADER_LEN
}

/// Reconstructs the Ethernet header in front of `buf[pos..]`, writing into
/// `buf[pos - ETH_HEADER_LEN .. pos]`. Returns the number of bytes
/// restored, or `None` if the slot has no cached template (evicted since
/// the sender last used it — spec §4.5 tie-break) or there isn't enough
/// head-room.
pub fn decompress(table: &SignatureTable, buf: &mut [u8], pos: usize, sid: u8) -> Option<usize> {
    let template = table.template(sid)?;
    if pos < template.len() {
        return None;
    }
    buf[pos - template.len()..pos].copy_from_slice(template);
    Some(template.len())
}
