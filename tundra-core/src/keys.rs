//! Key dictionary derivation (spec §4.1).
//!
//! Both dictionaries are built as hash chains rather than independent
//! per-slot hashes, following `secret.c`'s `init_keys`: each slot's key
//! feeds the next slot's keyed hash. This is not spelled out in spec.md
//! beyond "both peers MUST compute the same dictionary" — the chain
//! construction is carried over from the original implementation so a
//! from-scratch scheme isn't invented where a documented one exists.

use crate::constants::{KEY_LEN, KEY_MAX};
use crate::error::{InitError, InitResult};
use blake2::digest::consts::U16;
use blake2::digest::Mac;
use blake2::Blake2sMac;

type Blake2sMac128 = Blake2sMac<U16>;

/// Seed vector for the auth chain before the bound port is folded in.
/// Only a seed, not secret: both peers must use the same constant.
const SEED: [u8; KEY_LEN] = [
    179, 55, 2, 143, 241, 56, 61, 17, 189, 69, 20, 111, 172, 130, 54, 15,
];

/// Keyed BLAKE2 digest of `data` under `key`, producing a 16-byte tag.
fn keyed_blake2(data: &[u8], key: &[u8; KEY_LEN]) -> [u8; KEY_LEN] {
    let mut mac = Blake2sMac128::new_from_slice(key).expect("16-byte key is always valid");
    mac.update(data);
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&tag);
    out
}

/// Two parallel key tables derived once at startup from the shared secret
/// and the bound UDP port. Immutable afterwards; safe to share read-only
/// across the engine without locking (spec §5).
#[derive(Debug)]
pub struct KeyDictionary {
    auth: Vec<[u8; KEY_LEN]>,
    enc: Vec<[u8; KEY_LEN]>,
}

impl KeyDictionary {
    /// Derive both dictionaries from `secret` (the contents of
    /// `SECRET_FILE`) and the bound `port`. Deterministic: the same inputs
    /// on both peers produce identical dictionaries.
    pub fn derive(secret: &[u8], port: u16) -> InitResult<Self> {
        if secret.is_empty() {
            return Err(InitError::KeyDerivation("empty secret".into()));
        }

        let mut seed = SEED;
        seed[0..2].copy_from_slice(&port.to_be_bytes());

        let mut auth = Vec::with_capacity(KEY_MAX);
        let mut chain_key = seed;
        for _ in 0..KEY_MAX {
            chain_key = keyed_blake2(secret, &chain_key);
            auth.push(chain_key);
        }

        let auth_bytes: Vec<u8> = auth.iter().flatten().copied().collect();
        let mut enc = Vec::with_capacity(KEY_MAX);
        let mut chain_key = keyed_blake2(&auth_bytes, &auth[0]);
        for _ in 0..KEY_MAX {
            chain_key = keyed_blake2(secret, &chain_key);
            enc.push(chain_key);
        }

        Ok(Self { auth, enc })
    }

    fn slot(timestamp: u32, seq: u16) -> usize {
        (seq as u32).wrapping_add(timestamp) as usize % KEY_MAX
    }

    pub fn auth_key(&self, timestamp: u32, seq: u16) -> &[u8; KEY_LEN] {
        &self.auth[Self::slot(timestamp, seq)]
    }

    pub fn enc_key(&self, timestamp: u32, seq: u16) -> &[u8; KEY_LEN] {
        &self.enc[Self::slot(timestamp, seq)]
    }
}

/// `get_hash` from spec §4.2: keyed BLAKE2 digest of `buf` under
/// `auth[(seq + timestamp) mod KEY_MAX]`.
pub fn get_hash(dict: &KeyDictionary, buf: &[u8], timestamp: u32, seq: u16) -> [u8; KEY_LEN] {
    keyed_blake2(buf, dict.auth_key(timestamp, seq))
}
