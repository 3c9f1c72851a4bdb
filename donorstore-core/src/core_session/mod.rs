/*
    core_session - Transport session

    A session binds one local identity to a gossip transport, a content
    store and (optionally) a data directory. Stores are only obtained
    through `Session::open_store`.

    A session holds at most one replica per store name. Opening a name that
    is still open returns another handle to the same replica, so one peer
    id never authors two independent sequences.
*/

pub mod content;
pub mod error;
pub mod transport;

pub use content::ContentStore;
pub use error::SessionError;
pub use transport::{GossipHub, GossipMessage, MemoryTransport, Transport, TransportError};

use crate::config::SessionConfig;
use crate::metrics;
use crate::core_store::model::{PeerId, StoreAddress};
use crate::core_store::store::handle::{StoreContext, StoreTasks};
use crate::core_store::store::{AccessPolicy, StoreError, StoreHandle, StoreOptions, StoreResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// File name of a store's commit log inside its directory
pub const COMMIT_LOG_FILE: &str = "commit.log";

impl SessionConfig {
    /// Configured identity, or a fresh random one
    pub fn resolve_peer_id(&self) -> PeerId {
        self.peer_id
            .as_deref()
            .map(PeerId::new)
            .unwrap_or_else(PeerId::random)
    }
}

/// A store opened through the session
struct OpenedStore {
    policy: AccessPolicy,
    replica: Weak<StoreTasks>,
}

pub struct Session {
    peer_id: PeerId,
    data_dir: Option<PathBuf>,
    transport: Arc<dyn Transport>,
    content: Arc<ContentStore>,

    /// Store name -> policy and live replica
    opened: Mutex<HashMap<String, OpenedStore>>,
}

impl Session {
    /// Bring up a session on `transport`.
    ///
    /// The transport decides the local identity; a configured `peer_id` must
    /// agree with it.
    pub async fn open(config: &SessionConfig, transport: Arc<dyn Transport>) -> Result<Self, SessionError> {
        let peer_id = transport.local_peer().clone();
        if peer_id.as_str().is_empty() {
            return Err(SessionError::TransportInit("transport has an empty peer id".to_string()));
        }
        if let Some(configured) = &config.peer_id {
            if configured != peer_id.as_str() {
                return Err(SessionError::TransportInit(format!(
                    "configured peer id {} does not match transport identity {}",
                    configured, peer_id
                )));
            }
        }

        if let Some(dir) = &config.data_dir {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                SessionError::TransportInit(format!("cannot create data dir {}: {}", dir.display(), e))
            })?;
        }

        info!(
            peer = %peer_id,
            data_dir = ?config.data_dir,
            "session opened"
        );

        metrics::init_metrics();

        Ok(Session {
            peer_id,
            data_dir: config.data_dir.clone(),
            transport,
            content: Arc::new(ContentStore::new()),
            opened: Mutex::new(HashMap::new()),
        })
    }

    /// Open a store with default options
    pub async fn open_store(&self, name: &str, policy: AccessPolicy) -> StoreResult<StoreHandle> {
        self.open_store_with(name, policy, StoreOptions::default()).await
    }

    /// Open (or create) the named store.
    ///
    /// While a handle to the store is alive the same replica is returned
    /// and `options` are ignored.
    pub async fn open_store_with(
        &self,
        name: &str,
        policy: AccessPolicy,
        options: StoreOptions,
    ) -> StoreResult<StoreHandle> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::StoreOpen("store name must not be empty".to_string()));
        }

        // Held until the new replica is registered
        let mut opened = self.opened.lock().await;
        if let Some(existing) = opened.get(name) {
            if existing.policy != policy {
                return Err(StoreError::StoreOpen(format!(
                    "store {} is already open with write access [{}]",
                    name,
                    existing.policy.fingerprint()
                )));
            }
            if let Some(handle) = StoreHandle::upgrade(&existing.replica) {
                debug!(store = %handle.address(), "store already open, sharing replica");
                return Ok(handle);
            }
        }

        let address = StoreAddress::derive(name, &policy.fingerprint());
        debug!(store = %address, write = %policy.fingerprint(), "opening store");
        let commit_log_path = self
            .data_dir
            .as_ref()
            .map(|dir| dir.join(address.root.as_str()).join(COMMIT_LOG_FILE));

        let handle = StoreHandle::open(StoreContext {
            address,
            local: self.peer_id.clone(),
            policy: policy.clone(),
            options,
            transport: self.transport.clone(),
            content: self.content.clone(),
            commit_log_path,
        })
        .await?;

        opened.insert(name.to_string(), OpenedStore { policy, replica: handle.downgrade() });
        Ok(handle)
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn content(&self) -> &Arc<ContentStore> {
        &self.content
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Names of stores opened through this session
    pub async fn opened_stores(&self) -> Vec<String> {
        let opened = self.opened.lock().await;
        let mut names: Vec<_> = opened.keys().cloned().collect();
        names.sort();
        names
    }
}
