//! Error types for blind protocol operations

use crate::PartyId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during protocol execution
#[derive(Debug, Error)]
pub enum Error {
    /// Round invoked out of order; fatal for setup, never retried
    #[error("Protocol sequence violation: {0}")]
    ProtocolSequence(String),

    /// Request addressed to another game
    #[error("Game identifier mismatch: expected {expected}, got {actual}")]
    GameMismatch { expected: String, actual: String },

    /// Operation attempted before keys or roles were initialized
    #[error("Crypto state not ready: {0}")]
    CryptoState(String),

    /// A party re-submitted a fragment that is already present
    #[error("Duplicate contribution from party {0}")]
    DuplicateContribution(PartyId),

    /// A relay hop could not be reached or failed
    #[error("Relay chain broken at party {party}: {reason}")]
    ChainBreak { party: PartyId, reason: String },

    /// A strict fan-out gather did not hear back from every party
    #[error("Timed out gathering partial shares from parties {missing:?}")]
    PartialTimeout { missing: Vec<PartyId> },

    /// Share set is incomplete or malformed
    #[error("Invalid decryption shares: {0}")]
    InvalidShares(String),

    /// Vector length mismatch
    #[error("Shape mismatch: expected {expected} slots, got {actual}")]
    Shape { expected: usize, actual: usize },

    /// Invalid party ID
    #[error("Invalid party ID: {0}")]
    InvalidPartyId(usize),

    /// Invalid action or investigation target
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Invalid party configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Peer unreachable or connection-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Timeout waiting for a peer
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Peer answered with a response of the wrong type
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Error reported by a remote party
    #[error("Remote {kind:?} error: {message}")]
    Remote { kind: ErrorKind, message: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification carried over the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProtocolSequence,
    CryptoState,
    DuplicateContribution,
    ChainBreak,
    PartialTimeout,
    InvalidInput,
    Serialization,
    Transport,
    Timeout,
    Internal,
}

impl Error {
    /// Classification used on the wire and for retry decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ProtocolSequence(_) | Error::GameMismatch { .. } => ErrorKind::ProtocolSequence,
            Error::CryptoState(_) => ErrorKind::CryptoState,
            Error::DuplicateContribution(_) => ErrorKind::DuplicateContribution,
            Error::ChainBreak { .. } => ErrorKind::ChainBreak,
            Error::PartialTimeout { .. } => ErrorKind::PartialTimeout,
            Error::InvalidShares(_)
            | Error::Shape { .. }
            | Error::InvalidPartyId(_)
            | Error::InvalidTarget(_)
            | Error::InvalidConfig(_)
            | Error::Crypto(_) => ErrorKind::InvalidInput,
            Error::Serialization(_) | Error::Deserialization(_) => ErrorKind::Serialization,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::UnexpectedResponse(_) | Error::Internal(_) => ErrorKind::Internal,
            Error::Remote { kind, .. } => *kind,
        }
    }

    /// Only connection-level failures may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Benign re-insertion of a fragment the party already holds
    pub fn is_duplicate(&self) -> bool {
        self.kind() == ErrorKind::DuplicateContribution
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let mismatch = Error::GameMismatch {
            expected: "a".into(),
            actual: "b".into(),
        };
        assert_eq!(mismatch.kind(), ErrorKind::ProtocolSequence);
        assert!(!mismatch.is_retryable());

        assert!(Error::Transport("refused".into()).is_retryable());
        assert!(!Error::Timeout("hop".into()).is_retryable());

        let remote = Error::Remote {
            kind: ErrorKind::DuplicateContribution,
            message: "again".into(),
        };
        assert!(remote.is_duplicate());
    }
}
