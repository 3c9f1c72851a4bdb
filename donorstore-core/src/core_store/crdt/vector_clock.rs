/*
    vector_clock.rs - Per-origin heads of the append log

    Maps each origin peer to the length of the contiguous prefix of its
    entries a replica holds. Two replicas exchange their clocks to work out
    which entries the other one is missing.
*/

use crate::core_store::model::PeerId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Vector clock over origin sequence numbers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    /// Map from origin peer to highest contiguous sequence number
    clock: BTreeMap<PeerId, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        VectorClock { clock: BTreeMap::new() }
    }

    /// Get the sequence number for a peer (0 when unknown)
    pub fn get(&self, peer: &PeerId) -> u64 {
        self.clock.get(peer).copied().unwrap_or(0)
    }

    pub fn set(&mut self, peer: &PeerId, seq: u64) {
        self.clock.insert(peer.clone(), seq);
    }

    /// Take the maximum of each entry
    pub fn merge(&mut self, other: &VectorClock) {
        for (peer, &seq) in &other.clock {
            let current = self.clock.entry(peer.clone()).or_insert(0);
            *current = (*current).max(seq);
        }
    }

    /// True if every entry of `other` is <= the matching entry of `self`
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other.clock.iter().all(|(peer, &seq)| seq <= self.get(peer))
    }

    /// Causal comparison; `None` when the clocks are concurrent
    pub fn compare(&self, other: &VectorClock) -> Option<Ordering> {
        match (self.dominates(other), other.dominates(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.clock.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, u64)> {
        self.clock.iter().map(|(p, s)| (p, *s))
    }

    /// Sum of all entries: the number of entries covered by this clock
    pub fn total(&self) -> u64 {
        self.clock.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.clock.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clock.len()
    }
}
