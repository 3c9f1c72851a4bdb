//! Store lifecycle and on-disk persistence
//!
//! Run with: cargo test --test persistence

use donorstore_core::core_session::GossipHub;
use donorstore_core::core_store::model::DocumentId;
use donorstore_core::core_store::store::StoreState;
use donorstore_core::test_utils::{donor, TestPeer, TestPeerBuilder};
use tempfile::tempdir;

#[tokio::test]
async fn test_read_before_load_is_empty() {
    let hub = GossipHub::new();
    let dir = tempdir().unwrap();

    {
        let peer = TestPeerBuilder::new("alice").with_data_dir(dir.path()).spawn(&hub).await;
        peer.store.put(&donor("Ann")).unwrap();
        peer.store.put(&donor("Ben")).unwrap();
    }

    let peer = TestPeerBuilder::new("alice")
        .with_data_dir(dir.path())
        .without_load()
        .spawn(&hub)
        .await;
    assert_eq!(peer.store.state(), StoreState::Opening);
    assert!(peer.store.get_all().is_empty());
    assert_eq!(peer.store.get_count(), 0);

    peer.store.load().await.unwrap();
    assert_eq!(peer.store.state(), StoreState::Ready);
    assert_eq!(peer.names(), vec!["Ann", "Ben"]);
}

#[tokio::test]
async fn test_load_is_idempotent() {
    let hub = GossipHub::new();
    let dir = tempdir().unwrap();
    let peer = TestPeerBuilder::new("alice").with_data_dir(dir.path()).spawn(&hub).await;
    peer.store.put(&donor("Ann")).unwrap();

    let before = (peer.store.get_all(), peer.store.log_len());
    peer.store.load().await.unwrap();
    peer.store.load().await.unwrap();
    assert_eq!((peer.store.get_all(), peer.store.log_len()), before);
}

#[tokio::test]
async fn test_log_survives_restart() {
    let hub = GossipHub::new();
    let dir = tempdir().unwrap();

    {
        let peer = TestPeerBuilder::new("alice").with_data_dir(dir.path()).spawn(&hub).await;
        for name in ["Ann", "Ben", "Cat"] {
            peer.store.put(&donor(name)).unwrap();
        }
        peer.store.delete(DocumentId(2)).unwrap();
    }

    let peer = TestPeerBuilder::new("alice").with_data_dir(dir.path()).spawn(&hub).await;
    assert_eq!(peer.store.log_len(), 4);
    assert_eq!(peer.names(), vec!["Ann", "Cat"]);
    // Count based allocation after a delete reuses a live id
    assert_eq!(peer.store.next_id(), DocumentId(3));
}

#[tokio::test]
async fn test_merged_entries_are_persisted() {
    let hub = GossipHub::new();
    let dir = tempdir().unwrap();
    let alice = TestPeer::spawn(&hub, "alice").await;

    {
        let bob = TestPeerBuilder::new("bob").with_data_dir(dir.path()).spawn(&hub).await;
        alice.store.put(&donor("Ann")).unwrap();
        let replicated = donorstore_core::test_utils::wait_until(
            donorstore_core::test_utils::REPLICATION_TIMEOUT,
            || bob.store.get_count() == 1,
        )
        .await;
        assert!(replicated);
    }

    alice.transport.disconnect().await;
    let bob = TestPeerBuilder::new("bob").with_data_dir(dir.path()).spawn(&hub).await;
    assert_eq!(bob.names(), vec!["Ann"]);
}
