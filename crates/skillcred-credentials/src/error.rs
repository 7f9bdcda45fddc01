use skillcred_core::{CoreError, CredentialId, ReviewStatus, SubmissionId};
use skillcred_index::IndexError;

/// Errors surfaced by the issuance orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("submission not found: {0}")]
    SubmissionNotFound(SubmissionId),

    #[error("submission {submission_id} is {status}, not approved")]
    NotApproved {
        submission_id: SubmissionId,
        status: ReviewStatus,
    },

    #[error("invalid submission: {0}")]
    InvalidSubmission(#[from] CoreError),

    #[error("submission {0} already has an issuance attached")]
    SubmissionLocked(SubmissionId),

    /// The ledger write may or may not have landed. Retrying with the same
    /// submission id looks the credential up before writing again.
    #[error("ledger outcome unknown for submission {submission_id}: {reason}")]
    IndeterminateLedgerResponse {
        submission_id: SubmissionId,
        reason: String,
    },

    /// Another attempt holds the lease for this submission.
    #[error("issuance already in flight for submission {0}")]
    InFlight(SubmissionId),

    /// Terminal until a human intervenes.
    #[error("ledger rejected issuance for submission {submission_id}: {reason}")]
    LedgerRejected {
        submission_id: SubmissionId,
        reason: String,
    },

    /// Nothing was written; the ledger could not be consulted.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Nothing was written; the local store could not be consulted.
    #[error("index store error: {0}")]
    Store(#[from] IndexError),
}

/// The ledger holds the credential but the local copy could not be written.
///
/// Never surfaced to issuance callers; the sweeper repairs it.
#[derive(Debug, thiserror::Error)]
#[error("mirror write failed for submission {submission_id}: {source}")]
pub struct MirrorWriteFailed {
    pub submission_id: SubmissionId,
    #[source]
    pub source: IndexError,
}

/// Errors surfaced by the verification resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Neither store knows the identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// The ledger could not be reached and no usable cache entry exists.
    /// Callers must not read this as "invalid".
    #[error("verification unavailable: {0}")]
    VerificationUnavailable(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] CoreError),
}

/// Errors surfaced by revocation.
#[derive(Debug, thiserror::Error)]
pub enum RevokeError {
    #[error("credential not found: {0}")]
    NotFound(CredentialId),

    #[error("ledger rejected revocation: {0}")]
    Rejected(String),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
}
