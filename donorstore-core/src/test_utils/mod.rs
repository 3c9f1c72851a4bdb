//! Test utilities and helpers for DonorStore
//!
//! Shared by unit tests, integration tests and benches: in-process peers
//! on a gossip hub, donor fixtures and timeout-bounded waits.

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::*;
pub use fixtures::*;
