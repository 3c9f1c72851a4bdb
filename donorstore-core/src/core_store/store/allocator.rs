/*
    allocator.rs - Document identifier allocation

    next id = size of the locally visible index + 1, read at call time.

    This is not a reservation. Two replicas that have not yet seen each
    other's writes compute the same id; both entries are admitted to the
    log and the causally later one wins in the index.
*/

use crate::core_store::model::DocumentId;
use crate::core_store::store::index::MaterializedIndex;

/// Identifier the next `put` against this index would receive
pub fn next_id(index: &MaterializedIndex) -> DocumentId {
    DocumentId(index.len() as u64 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::model::PeerId;
    use crate::core_store::store::append_log::{AppendLog, Operation};
    use serde_json::json;

    #[test]
    fn test_empty_index_starts_at_one() {
        assert_eq!(next_id(&MaterializedIndex::new()), DocumentId(1));
    }

    #[test]
    fn test_follows_index_size() {
        let mut log = AppendLog::new(PeerId::new("a"));
        for i in 1..=3 {
            log.append_local(Operation::Put, DocumentId(i), json!({"n": i}).as_object().cloned())
                .unwrap();
        }
        assert_eq!(next_id(&MaterializedIndex::rebuild(log.entries())), DocumentId(4));
    }

    #[test]
    fn test_reuses_id_after_delete() {
        // Count-based allocation hands out an id that is still live once
        // a lower id has been deleted.
        let mut log = AppendLog::new(PeerId::new("a"));
        for i in 1..=3 {
            log.append_local(Operation::Put, DocumentId(i), json!({"n": i}).as_object().cloned())
                .unwrap();
        }
        log.append_local(Operation::Delete, DocumentId(1), None).unwrap();
        let index = MaterializedIndex::rebuild(log.entries());
        assert_eq!(next_id(&index), DocumentId(3));
        assert!(index.contains(DocumentId(3)));
    }
}
