/*
    types.rs - Common identifier types for the document store

    Defines:
    - Document identifiers (allocated from the index size)
    - Peer identities (origin of log entries)
    - Content addresses (blake3 digests of entry bodies)
    - Store addresses (stable collection address)
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a document in the materialized index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl DocumentId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(DocumentId)
    }
}

impl From<u64> for DocumentId {
    fn from(value: u64) -> Self {
        DocumentId(value)
    }
}

/// Identity of a replicating peer
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        PeerId(id.into())
    }

    /// Generate a random peer identity
    pub fn random() -> Self {
        PeerId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// blake3 digest rendered as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentAddress(pub String);

impl ContentAddress {
    /// Address the given bytes
    pub fn digest(bytes: &[u8]) -> Self {
        ContentAddress(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log output
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable address of a named collection: `/donorstore/<hash>/<name>`
///
/// The hash covers the name and the write policy, so two stores with the same
/// name but different policies never share an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreAddress {
    pub root: ContentAddress,
    pub name: String,
}

impl StoreAddress {
    pub const PREFIX: &'static str = "/donorstore";

    pub fn derive(name: &str, policy_fingerprint: &str) -> Self {
        let manifest = format!("{}\n{}", name, policy_fingerprint);
        StoreAddress {
            root: ContentAddress::digest(manifest.as_bytes()),
            name: name.to_string(),
        }
    }

    /// Parse an address rendered by `Display`
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix(Self::PREFIX)?.strip_prefix('/')?;
        let (root, name) = rest.split_once('/')?;
        if root.is_empty() || name.is_empty() {
            return None;
        }
        Some(StoreAddress {
            root: ContentAddress(root.to_string()),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for StoreAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", Self::PREFIX, self.root, self.name)
    }
}

/// Wall clock milliseconds, used for commit log frames only
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
