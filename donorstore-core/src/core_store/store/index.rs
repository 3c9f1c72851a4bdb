/*
    index.rs - Materialized document index

    Derived view of the append log: document id -> latest document.
    Built by folding the log in causal order with last-write-wins per key.
    Never mutated except by folding entries.
*/

use crate::core_store::model::{Document, DocumentId};
use crate::core_store::store::append_log::{LogEntry, Operation};
use std::collections::BTreeMap;

/// Current state of every document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializedIndex {
    documents: BTreeMap<DocumentId, Document>,
}

impl MaterializedIndex {
    pub fn new() -> Self {
        MaterializedIndex { documents: BTreeMap::new() }
    }

    /// Fold a causally ordered slice of entries from scratch
    pub fn rebuild(entries: &[LogEntry]) -> Self {
        let mut index = MaterializedIndex::new();
        for entry in entries {
            index.apply(entry);
        }
        index
    }

    /// Fold one entry. Callers only pass entries that sort after every
    /// entry already folded.
    pub fn apply(&mut self, entry: &LogEntry) {
        match (entry.op, &entry.value) {
            (Operation::Put, Some(fields)) => {
                self.documents
                    .insert(entry.key, Document::new(entry.key, fields.clone()));
            }
            (Operation::Delete, _) => {
                self.documents.remove(&entry.key);
            }
            (Operation::Put, None) => {}
        }
    }

    pub fn get(&self, id: DocumentId) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.documents.contains_key(&id)
    }

    /// All documents in ascending id order
    pub fn documents(&self) -> Vec<Document> {
        self.documents.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    /// Documents whose decimal id starts with `prefix`; empty prefix = all
    pub fn with_prefix(&self, prefix: &str) -> Vec<Document> {
        self.documents
            .values()
            .filter(|d| d.id.to_string().starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Documents matching a predicate
    pub fn query<F>(&self, mut predicate: F) -> Vec<Document>
    where
        F: FnMut(&Document) -> bool,
    {
        self.documents.values().filter(|d| predicate(d)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
