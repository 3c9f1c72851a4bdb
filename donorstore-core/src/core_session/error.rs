//! Session error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport or local storage could not be brought up
    #[error("Failed to initialize transport session: {0}")]
    TransportInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = SessionError::TransportInit("data dir unwritable".to_string());
        assert_eq!(
            err.to_string(),
            "Failed to initialize transport session: data dir unwritable"
        );
    }
}
