//! Payload scrambling (spec §4.3).
//!
//! `scramble`/`descramble` are the same operation: a BLAKE2-derived
//! keystream XORed over the payload. XOR is its own inverse, so the two
//! names exist purely for call-site clarity. Only the payload is touched;
//! header and MAC bytes never pass through here.

use crate::constants::KEY_LEN;
use crate::keys::KeyDictionary;
use blake2::digest::consts::U16;
use blake2::digest::Mac;
use blake2::Blake2sMac;

type Blake2sMac128 = Blake2sMac<U16>;

fn keystream_block(key: &[u8; KEY_LEN], seq: u16, timestamp: u32, counter: u32) -> [u8; KEY_LEN] {
    let mut mac = Blake2sMac128::new_from_slice(key).expect("16-byte key is always valid");
    mac.update(&seq.to_be_bytes());
    mac.update(&timestamp.to_be_bytes());
    mac.update(&counter.to_be_bytes());
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&tag);
    out
}

/// XOR `buf` in place with a keystream derived from `enc[(seq+timestamp)
/// mod KEY_MAX]`, `seq` and `timestamp`. Applying this twice with the same
/// key material is the identity.
pub fn scramble(dict: &KeyDictionary, buf: &mut [u8], seq: u16, timestamp: u32) {
    let key = dict.enc_key(timestamp, seq);
    for (counter, chunk) in buf.chunks_mut(KEY_LEN).enumerate() {
        let block = keystream_block(key, seq, timestamp, counter as u32);
        for (b, k) in chunk.iter_mut().zip(block.iter()) {
            *b ^= k;
        }
    }
}

/// Inverse of [`scramble`]. Provided as a distinct name for readability at
/// call sites; the transform is identical.
pub fn descramble(dict: &KeyDictionary, buf: &mut [u8], seq: u16, timestamp: u32) {
    scramble(dict, buf, seq, timestamp);
}
