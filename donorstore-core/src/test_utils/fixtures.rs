//! Test fixtures
//!
//! Donor records and in-process peers joined to a shared [`GossipHub`].

use crate::config::SessionConfig;
use crate::core_session::{GossipHub, MemoryTransport, Session, Transport};
use crate::core_store::model::PeerId;
use crate::core_store::store::{AccessPolicy, StoreHandle, StoreOptions};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Name every fixture store is opened under
pub const TEST_STORE: &str = "donors";

/// A donor record as the application would submit it
pub fn donor(name: &str) -> Value {
    json!({ "name": name })
}

/// A donor record with a few more attributes
pub fn donor_with(name: &str, blood_type: &str, age: u32) -> Value {
    json!({ "name": name, "bloodType": blood_type, "age": age })
}

/// Options for tests: no periodic announcements, short ack timeout
pub fn test_store_options() -> StoreOptions {
    StoreOptions {
        sync_interval: Duration::ZERO,
        ack_timeout: Duration::from_millis(500),
        event_capacity: 64,
    }
}

/// One peer: its transport, session and opened store
pub struct TestPeer {
    pub transport: MemoryTransport,
    pub session: Session,
    pub store: StoreHandle,
}

/// Builder for [`TestPeer`]
pub struct TestPeerBuilder {
    name: String,
    policy: AccessPolicy,
    data_dir: Option<PathBuf>,
    options: StoreOptions,
    load: bool,
}

impl TestPeerBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            policy: AccessPolicy::Wildcard,
            data_dir: None,
            options: test_store_options(),
            load: true,
        }
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Leave the store in the Opening state
    pub fn without_load(mut self) -> Self {
        self.load = false;
        self
    }

    pub async fn spawn(self, hub: &GossipHub) -> TestPeer {
        let transport = hub.join(PeerId::new(&self.name));
        let shared: Arc<dyn Transport> = Arc::new(transport.clone());
        let config = SessionConfig {
            peer_id: Some(self.name.clone()),
            data_dir: self.data_dir,
        };

        let session = Session::open(&config, shared)
            .await
            .unwrap_or_else(|e| panic!("session for {} failed to open: {}", self.name, e));
        let store = session
            .open_store_with(TEST_STORE, self.policy, self.options)
            .await
            .unwrap_or_else(|e| panic!("store for {} failed to open: {}", self.name, e));
        if self.load {
            store
                .load()
                .await
                .unwrap_or_else(|e| panic!("store for {} failed to load: {}", self.name, e));
        }

        TestPeer { transport, session, store }
    }
}

impl TestPeer {
    /// Loaded wildcard peer with test options
    pub async fn spawn(hub: &GossipHub, name: &str) -> TestPeer {
        TestPeerBuilder::new(name).spawn(hub).await
    }

    pub fn names(&self) -> Vec<String> {
        self.store
            .get_all()
            .iter()
            .filter_map(|d| d.get("name").and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}
