/*
    message.rs - Replication wire messages

    Published on the gossip topic named after the store address.

    Heads   - "this is what I hold", sent after load and periodically
    Entries - log entries the receiver may be missing

    Each entry inside `Entries` is kept as a raw JSON value and decoded on
    its own, so one malformed entry does not poison the rest of the batch.
*/

use crate::core_store::crdt::VectorClock;
use crate::core_store::store::append_log::LogEntry;
use crate::core_store::store::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncMessage {
    Heads { clock: VectorClock },
    Entries { entries: Vec<Value> },
}

impl SyncMessage {
    pub fn heads(clock: VectorClock) -> Self {
        SyncMessage::Heads { clock }
    }

    pub fn entries(entries: &[LogEntry]) -> StoreResult<Self> {
        let entries = entries
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SyncMessage::Entries { entries })
    }

    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| StoreError::Merge(format!("undecodable sync message: {}", e)))
    }
}

/// Decode raw entries, dropping the ones that do not parse.
///
/// Returns the decoded entries and the number dropped.
pub fn decode_entries(raw: Vec<Value>) -> (Vec<LogEntry>, usize) {
    let mut entries = Vec::with_capacity(raw.len());
    let mut dropped = 0;
    for value in raw {
        match serde_json::from_value::<LogEntry>(value) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                let err = StoreError::Merge(format!("undecodable entry: {}", e));
                warn!(error = %err, "dropping entry");
                dropped += 1;
            }
        }
    }
    (entries, dropped)
}
