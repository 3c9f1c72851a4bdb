//! Property tests for identifier allocation and merge convergence
//!
//! Run with: cargo test --test allocation_props

use donorstore_core::core_session::GossipHub;
use donorstore_core::core_store::model::{DocumentId, PeerId, Record};
use donorstore_core::core_store::store::{AccessPolicy, AppendLog, MaterializedIndex, Operation};
use donorstore_core::test_utils::{donor, TestPeer};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;

fn record(n: u64) -> Option<Record> {
    json!({ "n": n }).as_object().cloned()
}

#[derive(Debug, Clone)]
enum Op {
    Put(u64),
    Delete(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u64..6).prop_map(Op::Put),
        1 => (1u64..6).prop_map(Op::Delete),
    ]
}

fn replay(peer: &str, ops: &[Op]) -> AppendLog {
    let mut log = AppendLog::new(PeerId::new(peer));
    for (i, op) in ops.iter().enumerate() {
        match op {
            Op::Put(key) => log.append_local(Operation::Put, DocumentId(*key), record(i as u64)),
            Op::Delete(key) => log.append_local(Operation::Delete, DocumentId(*key), None),
        }
        .unwrap();
    }
    log
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_sequential_puts_get_unique_ids(n in 1usize..40) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let (count, ids) = runtime.block_on(async {
            let hub = GossipHub::new();
            let peer = TestPeer::spawn(&hub, "solo").await;
            let mut ids = Vec::with_capacity(n);
            for i in 0..n {
                ids.push(peer.store.put(&donor(&format!("donor {}", i))).unwrap());
            }
            (peer.store.get_count(), ids)
        });

        prop_assert_eq!(count, n);
        let unique: BTreeSet<_> = ids.iter().copied().collect();
        prop_assert_eq!(unique.len(), n);
        prop_assert_eq!(ids, (1..=n as u64).map(DocumentId).collect::<Vec<_>>());
    }

    #[test]
    fn prop_merge_order_does_not_matter(
        a_ops in prop::collection::vec(op_strategy(), 0..12),
        b_ops in prop::collection::vec(op_strategy(), 0..12),
    ) {
        let a = replay("a", &a_ops);
        let b = replay("b", &b_ops);

        let mut ab = a.clone();
        ab.merge_remote(b.entries().to_vec(), &AccessPolicy::Wildcard);
        let mut ba = b.clone();
        ba.merge_remote(a.entries().to_vec(), &AccessPolicy::Wildcard);

        prop_assert_eq!(ab.len(), a_ops.len() + b_ops.len());
        prop_assert_eq!(ab.heads(), ba.heads());
        prop_assert_eq!(
            MaterializedIndex::rebuild(ab.entries()),
            MaterializedIndex::rebuild(ba.entries())
        );
    }

    #[test]
    fn prop_merge_is_idempotent(ops in prop::collection::vec(op_strategy(), 1..12)) {
        let a = replay("a", &ops);
        let mut b = AppendLog::new(PeerId::new("b"));
        b.merge_remote(a.entries().to_vec(), &AccessPolicy::Wildcard);
        let once = MaterializedIndex::rebuild(b.entries());

        let outcome = b.merge_remote(a.entries().to_vec(), &AccessPolicy::Wildcard);
        prop_assert!(outcome.is_empty());
        prop_assert_eq!(outcome.duplicates, ops.len());
        prop_assert_eq!(MaterializedIndex::rebuild(b.entries()), once);
    }
}
