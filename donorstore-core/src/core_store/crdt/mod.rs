/*
    Ordering primitives for replicated log entries
*/

pub mod causal;
pub mod vector_clock;

pub use causal::{CausalPosition, LamportClock};
pub use vector_clock::VectorClock;
