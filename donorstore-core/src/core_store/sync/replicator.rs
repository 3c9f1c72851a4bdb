/*
    replicator.rs - Background replication tasks of a store

    inbound   - merges Entries, answers Heads with what the sender lacks
    outbound  - publishes local entries in batches, bounded by ack_timeout
    announcer - periodically publishes our heads (anti-entropy)

    Delivery is best effort. Anything lost in transit is recovered by the
    next heads exchange.
*/

use crate::core_session::GossipMessage;
use crate::core_store::crdt::VectorClock;
use crate::core_store::model::PeerId;
use crate::core_store::store::append_log::LogEntry;
use crate::core_store::store::errors::{StoreError, StoreResult};
use crate::core_store::store::handle::StoreShared;
use crate::core_store::sync::message::{decode_entries, SyncMessage};
use crate::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

pub(crate) async fn run_inbound(shared: Arc<StoreShared>, mut rx: mpsc::Receiver<GossipMessage>) {
    while let Some(message) = rx.recv().await {
        if &message.from == shared.local_peer() {
            continue;
        }
        if let Err(e) = handle_message(&shared, message).await {
            if e.is_fatal() {
                error!(store = %shared.address(), error = %e, "replication failed");
            } else {
                warn!(store = %shared.address(), error = %e, "replication message ignored");
            }
        }
    }
    debug!(store = %shared.address(), "inbound replication stopped");
}

async fn handle_message(shared: &StoreShared, message: GossipMessage) -> StoreResult<()> {
    let from = message.from;
    match SyncMessage::decode(&message.payload)? {
        SyncMessage::Entries { entries } => {
            let (entries, undecodable) = decode_entries(entries);
            metrics::record_dropped(&shared.address().name, undecodable);
            trace!(store = %shared.address(), from = %from, count = entries.len(), "received entries");
            shared.merge_remote(entries)?;
            Ok(())
        }
        SyncMessage::Heads { clock } => answer_heads(shared, &from, &clock).await,
    }
}

/// Send `from` the entries it lacks, and our heads if it has entries we lack
async fn answer_heads(shared: &StoreShared, from: &PeerId, theirs: &VectorClock) -> StoreResult<()> {
    let (missing, ours) = shared.entries_since(theirs)?;
    trace!(store = %shared.address(), from = %from, missing = missing.len(), "received heads");

    if !missing.is_empty() {
        let reached = publish(shared, &SyncMessage::entries(&missing)?).await?;
        debug!(store = %shared.address(), to = %from, entries = missing.len(), reached, "sent missing entries");
    }
    if !ours.dominates(theirs) {
        publish(shared, &SyncMessage::heads(ours)).await?;
    }
    Ok(())
}

pub(crate) async fn run_outbound(shared: Arc<StoreShared>, mut rx: mpsc::UnboundedReceiver<LogEntry>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }
        propagate(&shared, batch).await;
    }
    debug!(store = %shared.address(), "outbound replication stopped");
}

/// Publish a batch of local entries. Failures are diagnostics only: the
/// entries are already committed locally and peers catch up through heads.
async fn propagate(shared: &StoreShared, batch: Vec<LogEntry>) {
    let message = match SyncMessage::entries(&batch) {
        Ok(message) => message,
        Err(e) => {
            error!(store = %shared.address(), error = %e, "cannot encode entries for propagation");
            return;
        }
    };

    let timeout = shared.options().ack_timeout;
    match tokio::time::timeout(timeout, publish(shared, &message)).await {
        Ok(Ok(0)) => {
            debug!(store = %shared.address(), entries = batch.len(), "no peers reached, entries stay local");
        }
        Ok(Ok(reached)) => {
            trace!(store = %shared.address(), entries = batch.len(), reached, "entries propagated");
        }
        Ok(Err(e)) => {
            warn!(store = %shared.address(), entries = batch.len(), error = %e, "propagation failed");
        }
        Err(_) => {
            let err = StoreError::WriteAckTimeout { entries: batch.len(), timeout };
            warn!(store = %shared.address(), error = %err, "propagation not confirmed");
            metrics::record_ack_timeout(&shared.address().name);
        }
    }
}

pub(crate) async fn run_announcer(shared: Arc<StoreShared>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = announce(&shared).await {
            debug!(store = %shared.address(), error = %e, "heads announcement failed");
        }
    }
}

pub(crate) async fn announce(shared: &StoreShared) -> StoreResult<usize> {
    let heads = shared.heads()?;
    let reached = publish(shared, &SyncMessage::heads(heads)).await?;
    trace!(store = %shared.address(), reached, "announced heads");
    Ok(reached)
}

async fn publish(shared: &StoreShared, message: &SyncMessage) -> StoreResult<usize> {
    let topic = shared.address().to_string();
    Ok(shared.transport().publish(&topic, message.encode()?).await?)
}
