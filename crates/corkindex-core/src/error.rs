//! Error types for the corkindex pipeline.

use thiserror::Error;

/// Errors that can occur while reconstructing state from events.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error for {contract}.{event}: {reason}")]
    Decode {
        contract: String,
        event: String,
        reason: String,
    },

    #[error("Handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },
}

impl IndexerError {
    /// Returns `true` if the error must halt the event stream.
    ///
    /// Storage and configuration failures are fatal; everything else is
    /// scoped to a single event.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Config(_) | Self::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_fatal() {
        assert!(IndexerError::Storage("down".into()).is_fatal());
        assert!(IndexerError::Config("bad".into()).is_fatal());
    }

    #[test]
    fn decode_errors_are_not_fatal() {
        let err = IndexerError::Decode {
            contract: "CorkPool".into(),
            event: "Deposit".into(),
            reason: "missing field `assets`".into(),
        };
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Decode error for CorkPool.Deposit: missing field `assets`"
        );
    }
}
