/*
    Store subsystem - Document store over a replicated append log
*/

pub mod access;
pub mod allocator;
pub mod append_log;
pub mod commit_log;
pub mod errors;
pub mod handle;
pub mod index;

pub use access::{AccessPolicy, WILDCARD};
pub use allocator::next_id;
pub use append_log::{AppendLog, LogEntry, MergeOutcome, Operation};
pub use commit_log::CommitLog;
pub use errors::*;
pub use handle::{StoreHandle, StoreOptions, StoreState};
pub use index::MaterializedIndex;
