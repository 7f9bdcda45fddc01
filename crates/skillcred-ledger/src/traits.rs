use async_trait::async_trait;

use skillcred_core::{CredentialId, CredentialRecord, HolderId, IdempotencyKey, IssuerId};

use crate::error::{ArtifactError, LedgerError};
use crate::types::{IssueReceipt, IssueRequest};

/// Client side of the authoritative, append-only credential ledger.
///
/// Each implementation bridges to a concrete ledger (a contract gateway,
/// an in-process ledger for development, etc.). Implementations do not
/// retry writes; retry policy belongs to the caller.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Write a new credential.
    async fn issue(&self, request: IssueRequest) -> Result<IssueReceipt, LedgerError>;

    /// Fetch a credential by its ledger id. `Ok(None)` is a definitive absence.
    async fn get_credential(
        &self,
        id: &CredentialId,
    ) -> Result<Option<CredentialRecord>, LedgerError>;

    /// Find the credential written under an idempotency key, if any.
    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<CredentialRecord>, LedgerError>;

    /// All credentials held by a holder.
    async fn credentials_for_holder(
        &self,
        holder: &HolderId,
    ) -> Result<Vec<CredentialRecord>, LedgerError>;

    /// Capability check for the issuer role.
    async fn is_authorized_issuer(&self, issuer: &IssuerId) -> Result<bool, LedgerError>;

    /// Permanently deactivate a credential. Revoking twice is a no-op.
    async fn revoke(&self, id: &CredentialId, issuer: &IssuerId) -> Result<(), LedgerError>;

    /// Short name of this ledger backend (e.g. "ledger-memory").
    fn backend_id(&self) -> &str;
}

/// Content-addressed storage for proof artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store bytes and return their content hash.
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ArtifactError>;
}
