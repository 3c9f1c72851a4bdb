/*
    core_store - Replicated donor document store

    Handles:
    - Data model (documents, identifiers, addresses)
    - Causal ordering and heads tracking
    - Append log, materialized index and local persistence
    - Replication over a gossip transport
*/

pub mod crdt;
pub mod model;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use crdt::{CausalPosition, VectorClock};
pub use model::{ContentAddress, Document, DocumentId, PeerId, Record, StoreAddress};
pub use store::{AccessPolicy, StoreError, StoreHandle, StoreResult};
