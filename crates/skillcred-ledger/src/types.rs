use serde::{Deserialize, Serialize};

use skillcred_core::{CredentialId, HolderId, IdempotencyKey, IssuerId, SubmissionId, TxRef};

/// Metadata attached to every ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueMetadata {
    /// Lets the ledger recognize a retried write.
    pub idempotency_key: IdempotencyKey,
    pub submission_id: SubmissionId,
    pub issuer: IssuerId,
}

/// A credential write request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    pub holder: HolderId,
    pub skill: String,
    pub artifact_hash: Option<String>,
    pub metadata: IssueMetadata,
}

/// What the ledger returns for a confirmed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueReceipt {
    pub credential_id: CredentialId,
    pub tx_ref: TxRef,
}
