use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use skillcred_core::{CredentialId, CredentialRecord, HolderId, IdempotencyKey, IssuerId, TxRef};

use crate::error::LedgerError;
use crate::traits::LedgerClient;
use crate::types::{IssueReceipt, IssueRequest};

/// In-process, append-only credential ledger.
///
/// Enforces the same contract a deployed ledger does: only authorized
/// issuers may write, an idempotency key can be used once, and revocation
/// is permanent. Used for local development and tests.
pub struct MemoryLedger {
    /// Credential id → record.
    credentials: DashMap<String, CredentialRecord>,
    /// Idempotency key → credential id.
    keys: DashMap<String, CredentialId>,
    authorized_issuers: DashSet<IssuerId>,
    /// Successful writes, for observing duplicate-write bugs.
    writes: AtomicU64,
}

impl MemoryLedger {
    /// Create an empty ledger with no authorized issuers.
    pub fn new() -> Self {
        Self {
            credentials: DashMap::new(),
            keys: DashMap::new(),
            authorized_issuers: DashSet::new(),
            writes: AtomicU64::new(0),
        }
    }

    /// Create a ledger that accepts writes from the given issuers.
    pub fn with_issuers(issuers: impl IntoIterator<Item = IssuerId>) -> Self {
        let ledger = Self::new();
        for issuer in issuers {
            ledger.authorize_issuer(issuer);
        }
        ledger
    }

    /// Grant the issuer role.
    pub fn authorize_issuer(&self, issuer: IssuerId) {
        self.authorized_issuers.insert(issuer);
    }

    /// Withdraw the issuer role.
    pub fn deauthorize_issuer(&self, issuer: &IssuerId) -> bool {
        self.authorized_issuers.remove(issuer).is_some()
    }

    /// Number of credentials ever written.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of credentials currently on the ledger.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether the ledger holds no credentials.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    fn tx_ref(credential_id: &CredentialId, key: &IdempotencyKey) -> TxRef {
        let mut hasher = blake3::Hasher::new();
        hasher.update(credential_id.as_str().as_bytes());
        hasher.update(key.as_str().as_bytes());
        TxRef::new(format!("0x{}", hex::encode(hasher.finalize().as_bytes())))
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn issue(&self, request: IssueRequest) -> Result<IssueReceipt, LedgerError> {
        let issuer = request.metadata.issuer.clone();
        if !self.authorized_issuers.contains(&issuer) {
            return Err(LedgerError::Unauthorized(issuer.to_string()));
        }

        let key = request.metadata.idempotency_key.clone();
        match self.keys.entry(key.as_str().to_string()) {
            Entry::Occupied(existing) => Err(LedgerError::Duplicate(format!(
                "idempotency key {} already used by {}",
                key,
                existing.get()
            ))),
            Entry::Vacant(slot) => {
                let credential_id = CredentialId::new(format!("cred:{}", Uuid::now_v7()));
                let record = CredentialRecord {
                    id: credential_id.clone(),
                    holder: request.holder,
                    issuer,
                    skill: request.skill,
                    artifact_hash: request.artifact_hash,
                    issued_at: Utc::now(),
                    active: true,
                    idempotency_key: Some(key.clone()),
                };
                self.credentials
                    .insert(credential_id.as_str().to_string(), record);
                slot.insert(credential_id.clone());
                self.writes.fetch_add(1, Ordering::SeqCst);

                tracing::info!(
                    credential_id = %credential_id,
                    submission_id = %request.metadata.submission_id,
                    "ledger credential written"
                );

                Ok(IssueReceipt {
                    tx_ref: Self::tx_ref(&credential_id, &key),
                    credential_id,
                })
            }
        }
    }

    async fn get_credential(
        &self,
        id: &CredentialId,
    ) -> Result<Option<CredentialRecord>, LedgerError> {
        Ok(self.credentials.get(id.as_str()).map(|r| r.value().clone()))
    }

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<CredentialRecord>, LedgerError> {
        let Some(id) = self.keys.get(key.as_str()).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        self.get_credential(&id).await
    }

    async fn credentials_for_holder(
        &self,
        holder: &HolderId,
    ) -> Result<Vec<CredentialRecord>, LedgerError> {
        let mut records: Vec<CredentialRecord> = self
            .credentials
            .iter()
            .filter(|e| &e.holder == holder)
            .map(|e| e.value().clone())
            .collect();
        records.sort_by(|a, b| a.issued_at.cmp(&b.issued_at));
        Ok(records)
    }

    async fn is_authorized_issuer(&self, issuer: &IssuerId) -> Result<bool, LedgerError> {
        Ok(self.authorized_issuers.contains(issuer))
    }

    async fn revoke(&self, id: &CredentialId, issuer: &IssuerId) -> Result<(), LedgerError> {
        if !self.authorized_issuers.contains(issuer) {
            return Err(LedgerError::Unauthorized(issuer.to_string()));
        }
        let mut record = self
            .credentials
            .get_mut(id.as_str())
            .ok_or_else(|| LedgerError::NotFound(id.clone()))?;
        if record.active {
            record.active = false;
            tracing::info!(credential_id = %id, issuer = %issuer, "ledger credential revoked");
        }
        Ok(())
    }

    fn backend_id(&self) -> &str {
        "ledger-memory"
    }
}
