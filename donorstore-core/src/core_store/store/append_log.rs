/*
    append_log.rs - Append-only log of document operations

    The source of truth for a store. Holds local and merged remote entries
    sorted in causal order. Entries are immutable once admitted and are never
    removed; merging only inserts and re-sorts.

    Segments:
    - local segment: entries authored by this replica
    - remote segments: one per origin peer, filled by merges
*/

use crate::core_store::crdt::{CausalPosition, LamportClock, VectorClock};
use crate::core_store::model::{ContentAddress, DocumentId, PeerId, Record};
use crate::core_store::store::access::AccessPolicy;
use crate::core_store::store::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{trace, warn};

/// Kind of write carried by an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Put,
    Delete,
}

/// A single immutable entry of the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// blake3 address of the entry body
    pub hash: ContentAddress,

    pub op: Operation,

    /// Document the operation targets
    pub key: DocumentId,

    /// Document attributes for `Put`, absent for `Delete`
    pub value: Option<Record>,

    pub position: CausalPosition,

    /// Peer that authored the entry
    pub origin: PeerId,

    /// 1-based sequence number within the origin's entries
    pub seq: u64,
}

/// Hashed portion of an entry
#[derive(Serialize)]
struct EntryBody<'a> {
    op: Operation,
    key: DocumentId,
    value: &'a Option<Record>,
    position: &'a CausalPosition,
    origin: &'a PeerId,
    seq: u64,
}

/// Owned counterpart of [`EntryBody`] for reading bodies back
#[derive(Deserialize)]
struct StoredBody {
    op: Operation,
    key: DocumentId,
    value: Option<Record>,
    position: CausalPosition,
    origin: PeerId,
    seq: u64,
}

impl LogEntry {
    /// Build an entry and compute its content address
    pub fn new(
        op: Operation,
        key: DocumentId,
        value: Option<Record>,
        position: CausalPosition,
        seq: u64,
    ) -> StoreResult<Self> {
        let origin = position.peer.clone();
        let mut entry = LogEntry {
            hash: ContentAddress(String::new()),
            op,
            key,
            value,
            position,
            origin,
            seq,
        };
        entry.hash = ContentAddress::digest(&entry.body_bytes()?);
        Ok(entry)
    }

    /// Canonical bytes the hash is computed over
    pub fn body_bytes(&self) -> StoreResult<Vec<u8>> {
        let body = EntryBody {
            op: self.op,
            key: self.key,
            value: &self.value,
            position: &self.position,
            origin: &self.origin,
            seq: self.seq,
        };
        Ok(serde_json::to_vec(&body)?)
    }

    /// Rebuild an entry from the bytes `body_bytes` produced
    pub fn from_body(bytes: &[u8]) -> StoreResult<Self> {
        let body: StoredBody = serde_json::from_slice(bytes)?;
        let entry = LogEntry {
            hash: ContentAddress::digest(bytes),
            op: body.op,
            key: body.key,
            value: body.value,
            position: body.position,
            origin: body.origin,
            seq: body.seq,
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Structural checks applied to every entry arriving from elsewhere
    pub fn validate(&self) -> StoreResult<()> {
        if self.origin.as_str().is_empty() {
            return Err(StoreError::Merge("entry has an empty origin".to_string()));
        }
        if self.seq == 0 {
            return Err(StoreError::Merge(format!(
                "entry from {} has sequence number 0",
                self.origin
            )));
        }
        if self.position.peer != self.origin {
            return Err(StoreError::Merge(format!(
                "entry from {} carries position of {}",
                self.origin, self.position.peer
            )));
        }
        match (self.op, &self.value) {
            (Operation::Put, None) => {
                return Err(StoreError::Merge(format!("PUT {} without a value", self.key)))
            }
            (Operation::Delete, Some(_)) => {
                return Err(StoreError::Merge(format!("DELETE {} with a value", self.key)))
            }
            _ => {}
        }
        let expected = ContentAddress::digest(&self.body_bytes()?);
        if expected != self.hash {
            return Err(StoreError::Merge(format!(
                "hash mismatch for {}#{}: expected {}, got {}",
                self.origin,
                self.seq,
                expected.short(),
                self.hash.short()
            )));
        }
        Ok(())
    }

    pub fn is_local_to(&self, peer: &PeerId) -> bool {
        &self.origin == peer
    }
}

/// Result of merging a batch of entries
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Entries newly admitted, in arrival order
    pub admitted: Vec<LogEntry>,

    /// Entries already present
    pub duplicates: usize,

    /// Entries dropped as malformed or not permitted
    pub rejected: usize,
}

impl MergeOutcome {
    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }
}

/// Append-only, causally ordered log
#[derive(Debug, Clone)]
pub struct AppendLog {
    local: PeerId,

    /// All entries in causal order
    entries: Vec<LogEntry>,

    /// (origin, seq) of every admitted entry
    seen: HashSet<(PeerId, u64)>,

    /// Contiguous prefix per origin
    heads: VectorClock,

    clock: LamportClock,

    /// Next local sequence number
    next_seq: u64,
}

impl AppendLog {
    pub fn new(local: PeerId) -> Self {
        AppendLog {
            local,
            entries: Vec::new(),
            seen: HashSet::new(),
            heads: VectorClock::new(),
            clock: LamportClock::new(),
            next_seq: 1,
        }
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    /// Advance clock and local sequence past an entry without admitting it.
    ///
    /// Used when a persisted log is known but not yet replayed, so that
    /// local appends made before the replay never reuse a sequence number.
    pub fn observe(&mut self, entry: &LogEntry) {
        self.clock.observe(entry.position.clock);
        if entry.is_local_to(&self.local) {
            self.next_seq = self.next_seq.max(entry.seq + 1);
        }
    }

    /// Append a locally authored operation.
    ///
    /// The new entry is causally after everything currently known, so it
    /// lands at the tail and the log stays sorted.
    pub fn append_local(
        &mut self,
        op: Operation,
        key: DocumentId,
        value: Option<Record>,
    ) -> StoreResult<LogEntry> {
        let position = CausalPosition::new(self.clock.tick(), self.local.clone());
        let seq = self.next_seq;
        let entry = LogEntry::new(op, key, value, position, seq)?;

        self.next_seq += 1;
        self.record_seen(&entry.origin, entry.seq);
        self.entries.push(entry.clone());

        trace!(key = %entry.key, seq, position = %entry.position, "appended local entry");
        Ok(entry)
    }

    /// Merge entries received from peers (or replayed from disk).
    ///
    /// Duplicates are skipped, malformed or unauthorized entries are logged
    /// and dropped. Admitted entries are re-sorted into causal order.
    pub fn merge_remote(&mut self, entries: Vec<LogEntry>, policy: &AccessPolicy) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for entry in entries {
            if self.contains(&entry.origin, entry.seq) {
                outcome.duplicates += 1;
                continue;
            }
            if let Err(e) = entry.validate() {
                warn!(origin = %entry.origin, seq = entry.seq, error = %e, "dropping malformed entry");
                outcome.rejected += 1;
                continue;
            }
            if !policy.permits(&entry.origin) {
                warn!(origin = %entry.origin, seq = entry.seq, "dropping entry from unauthorized writer");
                outcome.rejected += 1;
                continue;
            }

            self.observe(&entry);
            self.record_seen(&entry.origin, entry.seq);
            self.entries.push(entry.clone());
            outcome.admitted.push(entry);
        }

        if !outcome.admitted.is_empty() {
            self.entries.sort_by(|a, b| a.position.cmp(&b.position));
        }

        outcome
    }

    fn record_seen(&mut self, origin: &PeerId, seq: u64) {
        self.seen.insert((origin.clone(), seq));
        let mut head = self.heads.get(origin);
        while self.seen.contains(&(origin.clone(), head + 1)) {
            head += 1;
        }
        self.heads.set(origin, head);
    }

    pub fn contains(&self, origin: &PeerId, seq: u64) -> bool {
        self.seen.contains(&(origin.clone(), seq))
    }

    /// Entries a replica with the given heads has not got, in causal order
    pub fn entries_since(&self, heads: &VectorClock) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.seq > heads.get(&e.origin))
            .cloned()
            .collect()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Find an entry by content address
    pub fn get(&self, hash: &ContentAddress) -> Option<&LogEntry> {
        self.entries.iter().find(|e| &e.hash == hash)
    }

    /// Entries authored by this replica
    pub fn local_segment(&self) -> impl Iterator<Item = &LogEntry> {
        self.segment(&self.local)
    }

    /// Entries authored by one origin
    pub fn segment<'a>(&'a self, origin: &'a PeerId) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries.iter().filter(move |e| &e.origin == origin)
    }

    /// Every origin with at least one entry
    pub fn origins(&self) -> BTreeSet<PeerId> {
        self.entries.iter().map(|e| e.origin.clone()).collect()
    }

    pub fn heads(&self) -> &VectorClock {
        &self.heads
    }

    /// Current Lamport time
    pub fn clock(&self) -> u64 {
        self.clock.time()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
