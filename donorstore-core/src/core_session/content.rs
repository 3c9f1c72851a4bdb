//! Content-addressed block storage
//!
//! Blocks are keyed by the blake3 digest of their bytes. Stores put every
//! entry body here; the resulting address is the entry hash.

use crate::core_store::model::ContentAddress;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct ContentStore {
    blocks: RwLock<HashMap<ContentAddress, Vec<u8>>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a block and return its address. Storing the same bytes twice is a no-op.
    pub fn put(&self, bytes: &[u8]) -> ContentAddress {
        let address = ContentAddress::digest(bytes);
        self.blocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.clone())
            .or_insert_with(|| bytes.to_vec());
        address
    }

    pub fn get(&self, address: &ContentAddress) -> Option<Vec<u8>> {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    pub fn contains(&self, address: &ContentAddress) -> bool {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.blocks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let store = ContentStore::new();
        let addr = store.put(b"block");
        assert_eq!(addr, ContentAddress::digest(b"block"));
        assert_eq!(store.get(&addr), Some(b"block".to_vec()));
        assert!(store.contains(&addr));
    }

    #[test]
    fn test_duplicate_put_is_idempotent() {
        let store = ContentStore::new();
        store.put(b"same");
        store.put(b"same");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_block() {
        let store = ContentStore::new();
        assert!(store.is_empty());
        assert!(store.get(&ContentAddress::digest(b"absent")).is_none());
    }
}
