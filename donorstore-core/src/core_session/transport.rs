/*
  Transport - gossip primitive the store replicates over

  A transport delivers opaque payloads to every other peer subscribed to a
  topic. Delivery is best effort: a payload published while a peer is
  unreachable is never delivered to it. Stores recover missed entries by
  exchanging heads.

  GossipHub is an in-process implementation. Every peer joins the hub and
  gets a MemoryTransport; `disconnect`/`reconnect` model a partition.

┌─────────────────┐  publish(topic)  ┌────────────────┐
│ MemoryTransport │ ───────────────► │   GossipHub    │
│    (peer A)     │                  │ topic -> subs  │
└─────────────────┘                  └───────┬────────┘
                                             │ try_send
                          ┌──────────────────┼──────────────────┐
                          ▼                  ▼                  ▼
                     peer B rx          peer C rx          (A skipped)
*/

use crate::core_store::model::PeerId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, trace};

/// Per-subscriber queue depth
pub const SUBSCRIBER_CAPACITY: usize = 256;

/// Payload received from the gossip layer
#[derive(Debug, Clone)]
pub struct GossipMessage {
    pub topic: String,
    pub from: PeerId,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is disconnected")]
    Disconnected(PeerId),

    #[error("invalid topic: {0}")]
    InvalidTopic(String),
}

/// Gossip-replicated publish/subscribe primitive
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identity this transport publishes as
    fn local_peer(&self) -> &PeerId;

    /// Receive every payload other peers publish on `topic`
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<GossipMessage>, TransportError>;

    /// Publish to all other subscribers; returns how many peers it reached
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<usize, TransportError>;
}

struct Subscriber {
    peer: PeerId,
    tx: mpsc::Sender<GossipMessage>,
}

#[derive(Default)]
struct HubState {
    topics: HashMap<String, Vec<Subscriber>>,
    offline: HashSet<PeerId>,
}

/// In-process gossip hub shared by every peer of a test or demo
#[derive(Clone, Default)]
pub struct GossipHub {
    state: Arc<RwLock<HubState>>,
}

impl GossipHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a peer to the hub
    pub fn join(&self, peer: PeerId) -> MemoryTransport {
        debug!(peer = %peer, "peer joined gossip hub");
        MemoryTransport { peer, hub: self.clone() }
    }

    /// Number of live subscriptions on a topic
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let state = self.state.read().await;
        state
            .topics
            .get(topic)
            .map(|subs| subs.iter().filter(|s| !s.tx.is_closed()).count())
            .unwrap_or(0)
    }

    async fn set_online(&self, peer: &PeerId, online: bool) {
        let mut state = self.state.write().await;
        if online {
            state.offline.remove(peer);
        } else {
            state.offline.insert(peer.clone());
        }
    }

    async fn is_online(&self, peer: &PeerId) -> bool {
        !self.state.read().await.offline.contains(peer)
    }
}

/// One peer's attachment to a [`GossipHub`]
#[derive(Clone)]
pub struct MemoryTransport {
    peer: PeerId,
    hub: GossipHub,
}

impl MemoryTransport {
    /// Stop sending and receiving until `reconnect`
    pub async fn disconnect(&self) {
        info!(peer = %self.peer, "transport disconnected");
        self.hub.set_online(&self.peer, false).await;
    }

    pub async fn reconnect(&self) {
        info!(peer = %self.peer, "transport reconnected");
        self.hub.set_online(&self.peer, true).await;
    }

    pub async fn is_connected(&self) -> bool {
        self.hub.is_online(&self.peer).await
    }

    pub fn hub(&self) -> &GossipHub {
        &self.hub
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_peer(&self) -> &PeerId {
        &self.peer
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<GossipMessage>, TransportError> {
        if topic.is_empty() {
            return Err(TransportError::InvalidTopic("topic must not be empty".to_string()));
        }
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut state = self.hub.state.write().await;
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber { peer: self.peer.clone(), tx });
        debug!(peer = %self.peer, topic, "subscribed");
        Ok(rx)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<usize, TransportError> {
        let mut state = self.hub.state.write().await;
        if state.offline.contains(&self.peer) {
            return Err(TransportError::Disconnected(self.peer.clone()));
        }

        let HubState { topics, offline } = &mut *state;
        let Some(subscribers) = topics.get_mut(topic) else {
            return Ok(0);
        };
        subscribers.retain(|s| !s.tx.is_closed());

        let mut delivered = 0;
        for sub in subscribers.iter() {
            if sub.peer == self.peer || offline.contains(&sub.peer) {
                continue;
            }
            let message = GossipMessage {
                topic: topic.to_string(),
                from: self.peer.clone(),
                payload: payload.clone(),
            };
            match sub.tx.try_send(message) {
                Ok(()) => delivered += 1,
                Err(e) => trace!(to = %sub.peer, topic, error = %e, "gossip delivery skipped"),
            }
        }
        Ok(delivered)
    }
}
