//! L4 compression: same wire representation as L3 (the eth+IP invariant
//! header is stripped, the 9-byte variable block carried on the wire),
//! but the signature also folds in the transport ports so TCP/UDP flows
//! between the same two hosts get distinct session ids (spec §4.5). DNS
//! is excluded upstream (its ephemeral source port would thrash this
//! table) and goes through L3 instead.

use super::ipv4;
use super::table::SignatureTable;
use crate::frame;

const PORTS_LEN: usize = 4;
const SIGNATURE_LEN: usize = ipv4::SIGNATURE_LEN + PORTS_LEN;

fn signature(frame: &[u8]) -> Option<[u8; SIGNATURE_LEN]> {
    ipv4::eligible_header_len(frame)?;
    let (src_port, dst_port) = frame::transport_ports(frame)?;
    let mut sig = [0u8; SIGNATURE_LEN];
    sig[..ipv4::SIGNATURE_LEN].copy_from_slice(&ipv4::extract_signature(frame));
    sig[ipv4::SIGNATURE_LEN..ipv4::SIGNATURE_LEN + 2].copy_from_slice(&src_port.to_be_bytes());
    sig[ipv4::SIGNATURE_LEN + 2..].copy_from_slice(&dst_port.to_be_bytes());
    Some(sig)
}

/// `Some(sid)` if this frame's flow (addresses, protocol, ports) has
/// been seen before, `None` if ineligible or being learned for the
/// first time.
pub fn classify(table: &mut SignatureTable, frame: &[u8]) -> Option<u8> {
    let sig = signature(frame)?;
    table.classify(&sig)
}

/// Strips the eth+IP invariant header exactly like L3; ports stay on
/// the wire as part of the untouched transport header that follows.
pub fn compress(frame: &[u8], out: &mut [u8]) -> usize {
    debug_assert!(frame.len() >= ipv4::HEADER_SPAN);
    let variable = ipv4::extract_variable(frame);
    out[..ipv4::VARIABLE_LEN].copy_from_slice(&variable);
    ipv4::SIGNATURE_LEN
}

/// Reconstructs the eth+IP header, mirroring [`super::l3::decompress`].
/// The cached signature carries the ports too, but those were never
/// stripped from the wire so only its first [`ipv4::SIGNATURE_LEN`]
/// bytes feed the rebuild.
pub fn decompress(table: &SignatureTable, buf: &mut [u8], pos: usize, sid: u8) -> Option<usize> {
    let template = table.template(sid)?;
    if pos < ipv4::SIGNATURE_LEN {
        return None;
    }
    let mut variable = [0u8; ipv4::VARIABLE_LEN];
    variable.copy_from_slice(&buf[pos..pos + ipv4::VARIABLE_LEN]);
    Some(ipv4::restore(&template[..ipv4::SIGNATURE_LEN], &variable, buf, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_frame(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16) -> Vec<u8> {
        let mut f = vec![0u8; ipv4::HEADER_SPAN + 8 + 8];
        f[12] = 0x08;
        f[13] = 0x00;
        f[14] = 0x45;
        f[23] = 17; // UDP
        f[26..30].copy_from_slice(&src);
        f[30..34].copy_from_slice(&dst);
        f[34..36].copy_from_slice(&src_port.to_be_bytes());
        f[36..38].copy_from_slice(&dst_port.to_be_bytes());
        f
    }

    #[test]
    fn compress_then_decompress_restores_the_header() {
        let mut table = SignatureTable::new(8);
        let frame = udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 4000, 5000);

        assert_eq!(classify(&mut table, &frame), None);
        let sid = classify(&mut table, &frame).unwrap();

        let mut wire = vec![0u8; ipv4::VARIABLE_LEN + (frame.len() - ipv4::SIGNATURE_LEN)];
        let stripped = compress(&frame, &mut wire);
        wire[ipv4::VARIABLE_LEN..].copy_from_slice(&frame[stripped..]);

        let mut buf = vec![0u8; 160];
        let pos = 64;
        buf[pos..pos + wire.len()].copy_from_slice(&wire);
        let restored = decompress(&table, &mut buf, pos, sid).unwrap();
        assert_eq!(restored, ipv4::SIGNATURE_LEN);
        assert_eq!(&buf[pos - restored..pos + wire.len()], &frame[..]);
    }

    #[test]
    fn distinct_flows_same_hosts_get_distinct_sids() {
        let mut table = SignatureTable::new(8);
        let a = udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 4000, 5000);
        let b = udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 4001, 5000);
        classify(&mut table, &a);
        let sid_a = classify(&mut table, &a);
        assert_eq!(classify(&mut table, &b), None, "distinct source port must relearn");
        assert_ne!(classify(&mut table, &b), sid_a);
    }
}
