//! Replication notifications
//!
//! Emitted after remote entries have been merged and the index rebuilt,
//! so receivers only ever observe a fully merged snapshot.

use crate::core_store::model::{Document, StoreAddress};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A merge that admitted at least one entry
#[derive(Debug, Clone)]
pub struct ReplicationEvent {
    pub address: StoreAddress,

    /// Number of entries admitted by this merge
    pub merged: usize,

    /// Index contents right after the rebuild
    pub documents: Arc<Vec<Document>>,
}

impl ReplicationEvent {
    pub fn new(address: StoreAddress, merged: usize, documents: Vec<Document>) -> Self {
        ReplicationEvent { address, merged, documents: Arc::new(documents) }
    }
}

/// Broadcasts replication events to every subscriber
#[derive(Clone)]
pub struct ReplicationNotifier {
    tx: broadcast::Sender<ReplicationEvent>,
}

impl ReplicationNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers that received the event
    pub fn notify(&self, event: ReplicationEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplicationEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Run `handler` for every event until the notifier is dropped
    pub fn on_replicated<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(ReplicationEvent) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "replication handler lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("replication notifier closed");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::model::DocumentId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn event(merged: usize) -> ReplicationEvent {
        let address = StoreAddress::derive("donors", "*");
        let docs = vec![Document::new(DocumentId(1), Default::default())];
        ReplicationEvent::new(address, merged, docs)
    }

    #[tokio::test]
    async fn test_notify_without_subscribers() {
        let notifier = ReplicationNotifier::new(4);
        assert_eq!(notifier.subscriber_count(), 0);
        assert_eq!(notifier.notify(event(1)), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let notifier = ReplicationNotifier::new(4);
        let mut rx1 = notifier.subscribe();
        let mut rx2 = notifier.subscribe();

        assert_eq!(notifier.notify(event(2)), 2);
        assert_eq!(rx1.recv().await.unwrap().merged, 2);
        assert_eq!(rx2.recv().await.unwrap().documents.len(), 1);
    }

    #[tokio::test]
    async fn test_on_replicated_runs_handler_until_closed() {
        let notifier = ReplicationNotifier::new(4);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let task = notifier.on_replicated(move |e| {
            counter.fetch_add(e.merged, Ordering::SeqCst);
        });

        notifier.notify(event(3));
        drop(notifier);

        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
