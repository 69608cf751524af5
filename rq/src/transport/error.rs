//! Transport error types

use std::time::Duration;

use thiserror::Error;

/// Ways an attempt can fail without producing a response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request aborted")]
    Aborted,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Aborts and timeouts share one retry path
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_abort() {
        assert!(TransportError::Aborted.is_abort());
        assert!(TransportError::Timeout(Duration::from_millis(5)).is_abort());
        assert!(!TransportError::Network("refused".to_string()).is_abort());
    }

    #[test]
    fn test_timeout_message() {
        let msg = TransportError::Timeout(Duration::from_millis(250)).to_string();
        assert_eq!(msg, "Request timed out after 250ms");
    }
}
