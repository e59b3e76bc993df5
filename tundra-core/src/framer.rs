//! Builds and validates on-wire packets (spec §4.4). Outbound framing
//! never allocates: callers reserve head-room in their own buffer and
//! hand this module a `header_pos` to write into, exploiting that
//! compression (when it runs) always strips at least `HEADER_LEN`
//! bytes from the frame's front (spec §9).

use std::net::SocketAddr;

use crate::constants::{HEADER_LEN, MAC_LEN, TIMESTAMP_DELTA_MAX};
use crate::header::{Opcode, PacketHeader};
use crate::keys::{get_hash, KeyDictionary};
use crate::scramble::{descramble, scramble};

/// Reasons a packet never reaches its pipeline's far end (spec §7):
/// counted and logged, never propagated as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    TooShort,
    BadOpcode,
    AddressMismatch,
    TimestampDrift,
    MacMismatch,
    Ipv6,
    DnsAaaa,
    ShortEthernetFrame,
}

/// Builds a complete outbound datagram in place at `buf[header_pos..]`:
/// `buf[header_pos + HEADER_LEN .. header_pos + HEADER_LEN + payload_len]`
/// must already hold the (unscrambled) payload. Scrambles it, writes the
/// header in front, and appends the MAC. Returns the total datagram
/// length starting at `header_pos`.
#[allow(clippy::too_many_arguments)]
pub fn build_outbound(
    dict: &KeyDictionary,
    buf: &mut [u8],
    header_pos: usize,
    payload_len: usize,
    opcode: Opcode,
    sid: u8,
    sync: bool,
    seq: u16,
    timestamp: u32,
) -> usize {
    let payload_start = header_pos + HEADER_LEN;
    let payload_end = payload_start + payload_len;
    let mac_start = payload_end;

    scramble(dict, &mut buf[payload_start..payload_end], seq, timestamp);

    let header = PacketHeader::new(opcode, seq, timestamp).with_sync(sync).with_sid(sid);
    header.encode(&mut buf[header_pos..payload_start]);

    let mac = get_hash(dict, &buf[header_pos..mac_start], timestamp, seq);
    buf[mac_start..mac_start + MAC_LEN].copy_from_slice(&mac);

    HEADER_LEN + payload_len + MAC_LEN
}

/// Runs the five inbound checks of spec §4.4 in order, short-circuiting
/// on the first failure. On success, descrambles the payload in place
/// and returns the parsed header alongside the (now plaintext) payload
/// slice, excluding the trailing MAC.
pub fn validate_inbound<'a>(
    dict: &KeyDictionary,
    now: u32,
    peer_addr: Option<SocketAddr>,
    source: SocketAddr,
    datagram: &'a mut [u8],
) -> Result<(PacketHeader, &'a mut [u8]), DropReason> {
    if datagram.len() < HEADER_LEN + MAC_LEN {
        return Err(DropReason::TooShort);
    }
    let header = PacketHeader::decode(datagram).ok_or(DropReason::BadOpcode)?;

    if let Some(bound) = peer_addr {
        if bound != source {
            return Err(DropReason::AddressMismatch);
        }
    }

    let drift = now.abs_diff(header.timestamp);
    if drift > TIMESTAMP_DELTA_MAX {
        return Err(DropReason::TimestampDrift);
    }

    let mac_start = datagram.len() - MAC_LEN;
    let expected = get_hash(dict, &datagram[..mac_start], header.timestamp, header.seq);
    if datagram[mac_start..] != expected {
        return Err(DropReason::MacMismatch);
    }

    let payload = &mut datagram[HEADER_LEN..mac_start];
    descramble(dict, payload, header.seq, header.timestamp);
    Ok((header, payload))
}
