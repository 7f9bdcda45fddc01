//! Submissions, ledger credential records, and their local mirrors.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;
use crate::mirror_state::{MirrorEvent, MirrorStateMachine, MirrorStatus};
use crate::types::{CredentialId, HolderId, IdempotencyKey, IssuerId, SubmissionId, TxRef};

/// Review outcome recorded by the review collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A reviewed task submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub holder: HolderId,
    pub skill: String,
    /// Content hash of the uploaded proof, when the artifact store produced one.
    pub artifact_ref: Option<String>,
    pub review_status: ReviewStatus,
    pub reviewer: Option<String>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// "Submission approved" event emitted by the review collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovedSubmission {
    pub submission_id: SubmissionId,
    pub holder: HolderId,
    pub skill: String,
    #[serde(default)]
    pub artifact_ref: Option<String>,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub review_notes: Option<String>,
}

impl ApprovedSubmission {
    /// Check the fields a ledger write depends on.
    pub fn validate(&self) -> Result<(), CoreError> {
        SubmissionId::parse(self.submission_id.as_str())?;
        HolderId::parse(self.holder.as_str())?;
        if self.skill.trim().is_empty() {
            return Err(CoreError::MissingField("skill".into()));
        }
        Ok(())
    }

    /// Build the submission record, keeping `created_at` from an earlier version.
    pub fn into_submission(self, created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Submission {
        Submission {
            id: self.submission_id,
            holder: self.holder,
            skill: self.skill,
            artifact_ref: self.artifact_ref,
            review_status: ReviewStatus::Approved,
            reviewer: self.reviewer,
            review_notes: self.review_notes,
            created_at: created_at.unwrap_or(now),
            updated_at: now,
        }
    }
}

/// A credential as held by the ledger. The ledger is the only writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: CredentialId,
    pub holder: HolderId,
    pub issuer: IssuerId,
    pub skill: String,
    pub artifact_hash: Option<String>,
    pub issued_at: DateTime<Utc>,
    /// Cleared by revocation; never set again.
    pub active: bool,
    /// Key the credential was written under, if the ledger reports it.
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Local cache row shadowing one submission's ledger credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCredentialMirror {
    pub local_id: Uuid,
    pub submission_id: SubmissionId,
    pub idempotency_key: IdempotencyKey,
    pub holder: HolderId,
    pub skill: String,
    pub artifact_hash: Option<String>,
    pub issuer: Option<IssuerId>,
    pub ledger_id: Option<CredentialId>,
    pub tx_ref: Option<TxRef>,
    pub status: MirrorStatus,
    pub active: Option<bool>,
    pub issued_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub reviewer: Option<String>,
    pub review_notes: Option<String>,
    /// Number of times an attempt lease was taken on this row.
    pub attempts: u32,
    /// While set and in the future, an attempt owns the ledger call.
    pub lease_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

impl LocalCredentialMirror {
    /// A fresh `pending_ledger_write` row for a submission.
    pub fn pending(submission: &Submission, now: DateTime<Utc>) -> Self {
        Self {
            local_id: Uuid::now_v7(),
            submission_id: submission.id.clone(),
            idempotency_key: IdempotencyKey::for_submission(&submission.id),
            holder: submission.holder.clone(),
            skill: submission.skill.clone(),
            artifact_hash: submission.artifact_ref.clone(),
            issuer: None,
            ledger_id: None,
            tx_ref: None,
            status: MirrorStatus::PendingLedgerWrite,
            active: None,
            issued_at: None,
            failure_reason: None,
            reviewer: submission.reviewer.clone(),
            review_notes: submission.review_notes.clone(),
            attempts: 0,
            lease_until: None,
            created_at: now,
            updated_at: now,
            last_reconciled_at: None,
        }
    }

    /// Apply a state machine event.
    pub fn apply(&mut self, event: MirrorEvent, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.status = MirrorStateMachine::transition(self.status, event)?;
        self.updated_at = now;
        Ok(())
    }

    /// Record the ledger's confirmation of the write.
    pub fn confirm(
        &mut self,
        credential_id: CredentialId,
        tx_ref: Option<TxRef>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.apply(MirrorEvent::LedgerConfirmed, now)?;
        self.ledger_id = Some(credential_id);
        if tx_ref.is_some() {
            self.tx_ref = tx_ref;
        }
        self.failure_reason = None;
        self.lease_until = None;
        Ok(())
    }

    /// Copy the authoritative fields of a ledger record into this row.
    pub fn mirror_from(&mut self, record: &CredentialRecord, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.apply(MirrorEvent::MirrorWritten, now)?;
        self.ledger_id = Some(record.id.clone());
        self.holder = record.holder.clone();
        self.skill = record.skill.clone();
        self.issuer = Some(record.issuer.clone());
        self.artifact_hash = record.artifact_hash.clone();
        self.issued_at = Some(record.issued_at);
        self.active = Some(record.active);
        self.last_reconciled_at = Some(now);
        Ok(())
    }

    /// Mark the issuance as definitively rejected by the ledger.
    pub fn reject(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.apply(MirrorEvent::LedgerRejected, now)?;
        self.failure_reason = Some(reason.into());
        self.lease_until = None;
        Ok(())
    }

    /// Downgrade after the ledger definitively denied the credential exists.
    pub fn orphan(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.apply(MirrorEvent::LedgerAbsent, now)?;
        self.failure_reason = Some("ledger reports credential does not exist".into());
        self.last_reconciled_at = Some(now);
        Ok(())
    }

    /// Re-open a failed row for another issuance attempt.
    pub fn retry(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.apply(MirrorEvent::Retry, now)?;
        self.failure_reason = None;
        self.lease_until = None;
        Ok(())
    }

    /// Set the attempt lease to run `lease` from `now`.
    pub fn extend_lease(&mut self, lease: Duration, now: DateTime<Utc>) {
        self.lease_until = Some(now.checked_add_signed(lease).unwrap_or(DateTime::<Utc>::MAX_UTC));
        self.updated_at = now;
    }

    /// Whether an attempt currently owns the ledger call.
    pub fn lease_active(&self, now: DateTime<Utc>) -> bool {
        self.lease_until.is_some_and(|until| until > now)
    }

    /// Time since the row last agreed with the ledger.
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_reconciled_at.map(|at| now - at)
    }

    /// Whether the fast path may serve this row without asking the ledger.
    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.status == MirrorStatus::Mirrored && self.age(now).is_some_and(|age| age <= max_age)
    }

    /// Rebuild the ledger record from the cached copy, if it is complete.
    pub fn cached_record(&self) -> Option<CredentialRecord> {
        Some(CredentialRecord {
            id: self.ledger_id.clone()?,
            holder: self.holder.clone(),
            issuer: self.issuer.clone()?,
            skill: self.skill.clone(),
            artifact_hash: self.artifact_hash.clone(),
            issued_at: self.issued_at?,
            active: self.active?,
            idempotency_key: Some(self.idempotency_key.clone()),
        })
    }

    /// Whether the cached copy contradicts the ledger on validity-relevant fields.
    pub fn disagrees_with(&self, record: &CredentialRecord) -> bool {
        self.active != Some(record.active) || self.holder != record.holder || self.skill != record.skill
    }

    /// What the API may say about this submission's issuance.
    pub fn issuance_view(&self) -> IssuanceView {
        let state = match self.status {
            MirrorStatus::PendingLedgerWrite => IssuanceState::Issuing,
            MirrorStatus::LedgerConfirmedUnmirrored => IssuanceState::Confirmed,
            MirrorStatus::Mirrored => IssuanceState::Issued,
            MirrorStatus::MirrorFailed => IssuanceState::IssuanceFailed,
            MirrorStatus::Orphaned => IssuanceState::Orphaned,
        };
        IssuanceView {
            submission_id: self.submission_id.clone(),
            state,
            mirror_status: Some(self.status),
            credential_id: self.ledger_id.clone(),
            failure_reason: self.failure_reason.clone(),
        }
    }
}

/// Submission-level issuance state shown to UI/API collaborators.
///
/// `Issued` is reported only once the mirror is `mirrored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuanceState {
    /// Review is pending or was rejected; issuance cannot start.
    NotApproved,
    Approved,
    Issuing,
    Confirmed,
    Issued,
    IssuanceFailed,
    Orphaned,
}

/// Issuance summary for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceView {
    pub submission_id: SubmissionId,
    pub state: IssuanceState,
    pub mirror_status: Option<MirrorStatus>,
    pub credential_id: Option<CredentialId>,
    pub failure_reason: Option<String>,
}

impl IssuanceView {
    /// View for a submission with no issuance attempt yet.
    pub fn unissued(submission: &Submission) -> Self {
        let state = if submission.review_status == ReviewStatus::Approved {
            IssuanceState::Approved
        } else {
            IssuanceState::NotApproved
        };
        Self {
            submission_id: submission.id.clone(),
            state,
            mirror_status: None,
            credential_id: None,
            failure_reason: None,
        }
    }
}
