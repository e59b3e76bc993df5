//! Normative constants from spec §6. Both peers of a tunnel MUST be built
//! with the same values here; nothing negotiates them on the wire.

/// Size in bytes of a single key slot in either dictionary.
pub const KEY_LEN: usize = 16;

/// Number of slots in each key dictionary. Selection is `(seq + timestamp)
/// mod KEY_MAX`, so this also bounds how far a stale key can be replayed.
pub const KEY_MAX: usize = 256;

/// On-wire header size: opcode(1) + flags(1) + sid(1) + reserved(1) +
/// seq(2) + timestamp(4) = 10 bytes. (spec.md's wire-format summary line
/// says "8 bytes" but its own field-by-field breakdown sums to 10; the
/// itemized layout is the more specific source and wins — see DESIGN.md.)
pub const HEADER_LEN: usize = 10;

/// Trailing authentication tag size.
pub const MAC_LEN: usize = 16;

/// Timer period driving HELLO retransmission and TTL decrement, seconds.
pub const TIMEOUT_SECS: u64 = 5;

/// Retry period while a client has never connected, seconds.
pub const CONNECT_RETRY_SECS: u64 = 2;

/// Number of timer ticks a CONNECTED session survives without a valid
/// inbound packet before the tunnel is torn down.
pub const CONNECT_TTL: i32 = 6;

/// Maximum allowed clock skew between peers, seconds.
pub const TIMESTAMP_DELTA_MAX: u32 = 30;

/// Ticks between stats reports.
pub const STATS_TIMEOUT_MAX: u32 = 6;

/// Ticks between debug dumps of the compression tables.
pub const COMPRESS_TIMEOUT_MAX: u32 = STATS_TIMEOUT_MAX;

/// Number of session-id slots per compression layer/direction.
pub const COMPRESS_TABLE_SIZE: usize = 64;

/// Largest Ethernet frame the tunnel will carry end to end.
pub const MAX_FRAME: usize = 1600;

/// Head-room reserved in front of a frame to let decompression prepend a
/// reconstructed header template without copying the payload forward.
/// Must be >= the longest signature any layer captures (L4's).
pub const RESTORE_HEAD_ROOM: usize = 64;

/// Total scratch buffer size: head-room, frame, and trailing MAC.
pub const BUF_LEN: usize = RESTORE_HEAD_ROOM + MAX_FRAME + MAC_LEN;
