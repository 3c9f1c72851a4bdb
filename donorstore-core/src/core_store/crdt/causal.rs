/*
    causal.rs - Causal position of log entries

    Lamport clock plus origin peer as tiebreak. The ordering is total, so
    every replica sorts the same set of entries identically, and it respects
    each peer's local write order and everything that peer had merged before
    writing.
*/

use crate::core_store::model::PeerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an entry in causal order
///
/// Field order matters: the derived `Ord` compares `clock` first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CausalPosition {
    /// Lamport clock value
    pub clock: u64,

    /// Peer that authored the entry
    pub peer: PeerId,
}

impl CausalPosition {
    pub fn new(clock: u64, peer: PeerId) -> Self {
        CausalPosition { clock, peer }
    }
}

impl fmt::Display for CausalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.clock, self.peer)
    }
}

/// Lamport clock owned by one replica
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LamportClock {
    time: u64,
}

impl LamportClock {
    pub fn new() -> Self {
        LamportClock { time: 0 }
    }

    /// Advance for a local event and return the new time
    pub fn tick(&mut self) -> u64 {
        self.time += 1;
        self.time
    }

    /// Fold in a time observed on a remote entry
    pub fn observe(&mut self, remote: u64) {
        self.time = self.time.max(remote);
    }

    pub fn time(&self) -> u64 {
        self.time
    }
}
