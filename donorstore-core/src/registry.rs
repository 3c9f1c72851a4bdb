/*
    registry.rs - Donor registry facade

    What the application talks to. Owns one session and one store opened
    from configuration. `set_up` must complete before any other call.
*/

use crate::config::{Config, ConfigError};
use crate::core_session::{Session, SessionError, Transport};
use crate::core_store::model::{Document, DocumentId};
use crate::core_store::store::{StoreError, StoreHandle, StoreOptions};
use crate::core_store::sync::ReplicationEvent;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct DonorRegistry {
    session: Session,
    store: StoreHandle,
    replication_log: JoinHandle<()>,
}

impl DonorRegistry {
    /// Open the session and the configured store, then load it
    pub async fn set_up(config: &Config, transport: Arc<dyn Transport>) -> Result<Self, RegistryError> {
        config.validate()?;

        let session = Session::open(&config.session, transport).await?;
        let store = session
            .open_store_with(
                &config.store.name,
                config.store.access_policy(),
                StoreOptions::from(&config.store),
            )
            .await?;
        info!(address = %store.address(), "store address");

        store.load().await?;

        let replication_log = store.on_replicated(|event| {
            info!(
                store = %event.address,
                merged = event.merged,
                documents = event.documents.len(),
                "replicated"
            );
            for document in event.documents.iter() {
                debug!(store = %event.address, document = %document.to_json(), "document");
            }
        });

        Ok(DonorRegistry { session, store, replication_log })
    }

    /// Store a donor record under the next id and return that id
    pub fn put_data<T: Serialize + ?Sized>(&self, donor: &T) -> Result<DocumentId, RegistryError> {
        let id = self.store.put(donor)?;
        info!(id = %id, "donor recorded");
        Ok(id)
    }

    /// All donor records currently known
    pub fn get_data(&self) -> Vec<Document> {
        self.store.get_all()
    }

    /// Preview of the id the next `put_data` will use
    pub fn get_id(&self) -> DocumentId {
        self.store.next_id()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplicationEvent> {
        self.store.subscribe()
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl Drop for DonorRegistry {
    fn drop(&mut self) {
        self.replication_log.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_session::GossipHub;
    use crate::core_store::model::PeerId;
    use crate::test_utils::donor;
    use serde_json::json;
    use std::time::Duration;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.store.sync_interval = Duration::ZERO;
        config
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let hub = GossipHub::new();
        let registry = DonorRegistry::set_up(&test_config(), Arc::new(hub.join(PeerId::new("a"))))
            .await
            .unwrap();

        assert_eq!(registry.get_id(), DocumentId(1));
        assert_eq!(registry.put_data(&donor("Alice")).unwrap(), DocumentId(1));
        assert_eq!(registry.get_id(), DocumentId(2));

        let data = registry.get_data();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].to_json(), json!({"_id": 1, "name": "Alice"}));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let hub = GossipHub::new();
        let mut config = test_config();
        config.store.name.clear();

        let result = DonorRegistry::set_up(&config, Arc::new(hub.join(PeerId::new("a")))).await;
        assert!(matches!(result, Err(RegistryError::Config(_))));
    }

    #[tokio::test]
    async fn test_session_errors_are_wrapped() {
        let hub = GossipHub::new();
        let mut config = test_config();
        config.session.peer_id = Some("b".to_string());

        let result = DonorRegistry::set_up(&config, Arc::new(hub.join(PeerId::new("a")))).await;
        assert!(matches!(result, Err(RegistryError::Session(SessionError::TransportInit(_)))));
    }

    #[tokio::test]
    async fn test_put_rejected_for_foreign_writer() {
        let hub = GossipHub::new();
        let mut config = test_config();
        config.store.write_access = vec!["someone-else".to_string()];

        let registry = DonorRegistry::set_up(&config, Arc::new(hub.join(PeerId::new("a"))))
            .await
            .unwrap();
        assert!(matches!(
            registry.put_data(&donor("Alice")),
            Err(RegistryError::Store(StoreError::PermissionDenied(_)))
        ));
    }
}
