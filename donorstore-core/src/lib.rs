//! DonorStore: a peer-replicated donor document store.
//!
//! Each peer keeps an append-only log of document writes, folds it into an
//! index with last-write-wins per document id, and gossips log entries to
//! the other peers of the same store.

pub mod config;
pub mod core_session;
pub mod core_store;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod test_utils;

pub use config::Config;
pub use core_session::{GossipHub, MemoryTransport, Session, SessionError, Transport};
pub use core_store::{AccessPolicy, Document, DocumentId, PeerId, StoreError, StoreHandle};
pub use logging::{init_logging, LogLevel};
pub use registry::{DonorRegistry, RegistryError};
