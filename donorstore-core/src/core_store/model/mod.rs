/*
    Model subsystem - Documents and identifiers
*/

pub mod document;
pub mod types;

pub use document::*;
pub use types::*;
