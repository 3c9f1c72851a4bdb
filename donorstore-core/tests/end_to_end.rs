//! End-to-end tests through the DonorRegistry facade
//!
//! Run with: cargo test --test end_to_end

use donorstore_core::config::Config;
use donorstore_core::core_session::GossipHub;
use donorstore_core::core_store::model::{DocumentId, PeerId};
use donorstore_core::core_store::store::StoreState;
use donorstore_core::registry::DonorRegistry;
use donorstore_core::test_utils::{donor, donor_with, recv_event, REPLICATION_TIMEOUT};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn config() -> Config {
    let mut config = Config::default();
    config.store.sync_interval = Duration::ZERO;
    config
}

#[tokio::test]
async fn test_alice_then_bob() {
    let hub = GossipHub::new();
    let registry = DonorRegistry::set_up(&config(), Arc::new(hub.join(PeerId::new("clinic"))))
        .await
        .unwrap();
    assert_eq!(registry.store().state(), StoreState::Ready);

    assert_eq!(registry.put_data(&json!({"name": "Alice"})).unwrap(), DocumentId(1));
    assert_eq!(registry.put_data(&json!({"name": "Bob"})).unwrap(), DocumentId(2));

    let all: Vec<_> = registry.get_data().iter().map(|d| d.to_json()).collect();
    assert_eq!(
        all,
        vec![json!({"_id": 1, "name": "Alice"}), json!({"_id": 2, "name": "Bob"})]
    );
}

#[tokio::test]
async fn test_caller_supplied_id_is_ignored() {
    let hub = GossipHub::new();
    let registry = DonorRegistry::set_up(&config(), Arc::new(hub.join(PeerId::new("clinic"))))
        .await
        .unwrap();

    let id = registry.put_data(&json!({"_id": 99, "name": "Alice"})).unwrap();
    assert_eq!(id, DocumentId(1));
    assert_eq!(registry.get_data()[0].to_json(), json!({"_id": 1, "name": "Alice"}));
}

#[tokio::test]
async fn test_two_registries_share_records() {
    let hub = GossipHub::new();
    let north = DonorRegistry::set_up(&config(), Arc::new(hub.join(PeerId::new("north"))))
        .await
        .unwrap();
    let south = DonorRegistry::set_up(&config(), Arc::new(hub.join(PeerId::new("south"))))
        .await
        .unwrap();
    let mut events = south.subscribe();

    north.put_data(&donor_with("Alice", "O-", 34)).unwrap();
    let event = recv_event(&mut events, REPLICATION_TIMEOUT).await.unwrap();
    assert_eq!(event.merged, 1);

    assert_eq!(south.get_id(), DocumentId(2));
    assert_eq!(south.put_data(&donor("Bob")).unwrap(), DocumentId(2));
    assert_eq!(south.get_data()[0].get("bloodType"), Some(&json!("O-")));
}
