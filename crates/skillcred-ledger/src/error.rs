use std::time::Duration;

use skillcred_core::CredentialId;

/// Ledger client errors.
///
/// `Network` and `Timeout` are indeterminate: a write may or may not have
/// landed. Everything else is a definitive answer from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("issuer not authorized: {0}")]
    Unauthorized(String),

    #[error("duplicate credential: {0}")]
    Duplicate(String),

    #[error("ledger rejected request: {0}")]
    Rejected(String),

    #[error("credential not found: {0}")]
    NotFound(CredentialId),

    #[error("ledger network error: {0}")]
    Network(String),

    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),
}

impl LedgerError {
    /// Whether the outcome of the call is unknown.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// Artifact reference store errors.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact store unavailable: {0}")]
    Unavailable(String),

    #[error("artifact too large: {size} bytes exceeds {max}")]
    TooLarge { size: usize, max: usize },
}
