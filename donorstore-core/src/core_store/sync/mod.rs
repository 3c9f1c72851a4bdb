/*
    Sync subsystem - Replication between replicas of a store

    Wire messages, the background replication tasks, and the notifier that
    tells the application when remote entries have been merged.
*/

pub mod message;
pub mod notifier;
pub(crate) mod replicator;

pub use message::{decode_entries, SyncMessage};
pub use notifier::{ReplicationEvent, ReplicationNotifier};
