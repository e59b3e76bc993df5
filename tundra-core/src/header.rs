//! On-wire packet header (spec §3, §6): 10 bytes, network byte order for
//! the multi-byte fields.
//!
//! ```text
//! opcode(1) | flags(1) | sid(1) | reserved(1) | seq(2, BE) | timestamp(4, BE)
//! ```

use crate::constants::HEADER_LEN;

/// Requests the peer reset all three compression tables before this
/// packet (or any opcode carrying it) is processed further.
pub const F_SYNC: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Data = 0,
    DataCompressedL2 = 1,
    DataCompressedL3 = 2,
    DataCompressedL4 = 3,
    Hello = 4,
    Message = 5,
}

/// One past the largest valid opcode value; inbound opcodes `>= O_MAX`
/// are dropped before dispatch (spec §4.4).
pub const O_MAX: u8 = 6;

impl Opcode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Opcode::Data),
            1 => Some(Opcode::DataCompressedL2),
            2 => Some(Opcode::DataCompressedL3),
            3 => Some(Opcode::DataCompressedL4),
            4 => Some(Opcode::Hello),
            5 => Some(Opcode::Message),
            _ => None,
        }
    }

    pub fn is_data(self) -> bool {
        matches!(
            self,
            Opcode::Data | Opcode::DataCompressedL2 | Opcode::DataCompressedL3 | Opcode::DataCompressedL4
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub opcode: Opcode,
    pub flags: u8,
    pub sid: u8,
    pub seq: u16,
    pub timestamp: u32,
}

impl PacketHeader {
    pub fn new(opcode: Opcode, seq: u16, timestamp: u32) -> Self {
        Self { opcode, flags: 0, sid: 0, seq, timestamp }
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        if sync {
            self.flags |= F_SYNC;
        }
        self
    }

    pub fn with_sid(mut self, sid: u8) -> Self {
        self.sid = sid;
        self
    }

    pub fn is_sync(&self) -> bool {
        self.flags & F_SYNC != 0
    }

    /// Encode into `out[0..HEADER_LEN]`. Panics if `out` is shorter than
    /// `HEADER_LEN` — callers always operate on a pre-sized scratch buffer.
    pub fn encode(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= HEADER_LEN);
        out[0] = self.opcode as u8;
        out[1] = self.flags;
        out[2] = self.sid;
        out[3] = 0; // reserved
        out[4..6].copy_from_slice(&self.seq.to_be_bytes());
        out[6..10].copy_from_slice(&self.timestamp.to_be_bytes());
    }

    /// Parse a header from the front of `buf`. Returns `None` if the
    /// opcode byte is out of range; the length check itself happens one
    /// level up (spec §4.4, check order 1 before check order 2).
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let opcode = Opcode::from_u8(buf[0])?;
        let flags = buf[1];
        let sid = buf[2];
        let seq = u16::from_be_bytes([buf[4], buf[5]]);
        let timestamp = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
        Some(Self { opcode, flags, sid, seq, timestamp })
    }
}
