//! Generic learning cache backing each compression layer/direction (spec
//! §4.5). A signature's first sighting allocates a slot and reports "not
//! compressible" (verbatim send); later sightings hit the slot and report
//! the cached session id. Eviction is plain LRU keyed off a logical clock
//! so it needs no wall-clock dependency.

use ahash::AHashMap;

struct Slot {
    signature: Vec<u8>,
    last_used: u64,
}

pub struct SignatureTable {
    slots: Vec<Option<Slot>>,
    index: AHashMap<Vec<u8>, u8>,
    clock: u64,
}

impl SignatureTable {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity <= 256, "sid must fit in a u8");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            index: AHashMap::default(),
            clock: 0,
        }
    }

    /// Empty the table. Called on F_SYNC and on every DISCONNECTED
    /// transition (spec §4.4, §4.6).
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.index.clear();
        self.clock = 0;
    }

    /// Look up `signature`. A hit bumps recency and returns its session
    /// id: the frame is compressible this round. A miss learns a fresh
    /// slot (evicting the least-recently-used one if the table is full)
    /// and returns `None`: the header is sent verbatim this round so the
    /// peer can learn the same template.
    pub fn classify(&mut self, signature: &[u8]) -> Option<u8> {
        self.clock += 1;
        if let Some(&sid) = self.index.get(signature) {
            if let Some(slot) = self.slots[sid as usize].as_mut() {
                slot.last_used = self.clock;
            }
            return Some(sid);
        }
        let sid = self.allocate(signature);
        self.index.insert(signature.to_vec(), sid);
        None
    }

    fn allocate(&mut self, signature: &[u8]) -> u8 {
        let sid = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .unwrap_or_else(|| self.least_recently_used());
        if let Some(old) = self.slots[sid].take() {
            self.index.remove(&old.signature);
        }
        self.slots[sid] = Some(Slot { signature: signature.to_vec(), last_used: self.clock });
        sid as u8
    }

    fn least_recently_used(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.as_ref().map(|s| s.last_used).unwrap_or(0))
            .map(|(i, _)| i)
            .expect("table has at least one slot")
    }

    /// The template bytes cached under `sid`, if any slot holds one. A
    /// missing template (evicted or never learned) means the peer must
    /// fall back to an uncompressed send next round (spec §4.5 tie-break).
    pub fn template(&self, sid: u8) -> Option<&[u8]> {
        self.slots.get(sid as usize)?.as_ref().map(|s| s.signature.as_slice())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
