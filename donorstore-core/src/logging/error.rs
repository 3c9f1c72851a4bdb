//! Error types for the logging subsystem

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoggingError {
    /// Level name not one of trace, debug, info, warn, error
    #[error("unknown log level '{0}'")]
    UnknownLevel(String),

    /// Another global subscriber is already installed
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}
