use std::sync::Arc;

use chrono::Utc;

use skillcred_core::{
    ApprovedSubmission, CredentialId, CredentialRecord, IssuanceView, IssuerId, LifecycleConfig,
    LocalCredentialMirror, MirrorStatus, ReviewStatus, Submission, SubmissionId, TxRef,
};
use skillcred_index::{ClaimOutcome, IndexStore};
use skillcred_ledger::{
    ArtifactStore, IssueMetadata, IssueReceipt, IssueRequest, LedgerClient, LedgerError,
};

use crate::error::{IssueError, RevokeError};
use crate::ledger_call::bounded;
use crate::mirror_writer::{log_mirror_failure, write_mirror};

/// Successful answer to an issue request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    /// The ledger confirmed a credential for this submission during this call.
    ///
    /// `mirror_status` is anything but `Mirrored` when the local copy could
    /// not be written or the ledger record could not be read back. The
    /// credential is valid regardless and the sweeper finishes the mirror.
    Issued {
        record: CredentialRecord,
        mirror_status: MirrorStatus,
        tx_ref: Option<TxRef>,
    },
    /// A credential already existed for this submission; nothing was written.
    AlreadyIssued { record: CredentialRecord },
}

impl IssueOutcome {
    pub fn record(&self) -> &CredentialRecord {
        match self {
            Self::Issued { record, .. } | Self::AlreadyIssued { record } => record,
        }
    }
}

/// Takes approved submissions through ledger issuance and the local mirror.
///
/// Per submission the order is: claim the mirror row (insert-if-absent),
/// take the attempt lease, write to the ledger, persist the confirmation,
/// then mirror the record read back from the ledger. The ledger write and
/// its bookkeeping run in a spawned task so a dropped caller cannot
/// interrupt them.
#[derive(Clone)]
pub struct IssuanceOrchestrator {
    issuer: IssuerId,
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn IndexStore>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    config: LifecycleConfig,
}

impl IssuanceOrchestrator {
    pub fn new(
        issuer: IssuerId,
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn IndexStore>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            issuer,
            ledger,
            store,
            artifacts: None,
            config,
        }
    }

    /// Attach an artifact store for inline artifact bytes.
    pub fn with_artifact_store(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn issuer(&self) -> &IssuerId {
        &self.issuer
    }

    pub fn ledger_backend(&self) -> &str {
        self.ledger.backend_id()
    }

    /// Record a "submission approved" event from review.
    ///
    /// Artifact bytes are stored best-effort; if the artifact store fails the
    /// submission keeps whatever reference the event carried.
    pub async fn record_approval(
        &self,
        event: ApprovedSubmission,
        artifact_bytes: Option<Vec<u8>>,
    ) -> Result<Submission, IssueError> {
        event.validate()?;
        let submission_id = event.submission_id.clone();

        if let Some(mirror) = self.store.get_mirror(&submission_id)? {
            if !mirror.status.is_failed() {
                return Err(IssueError::SubmissionLocked(submission_id));
            }
        }

        let mut event = event;
        if let (Some(bytes), Some(artifacts)) = (artifact_bytes, &self.artifacts) {
            match artifacts.put(bytes).await {
                Ok(hash) => event.artifact_ref = Some(hash),
                Err(e) => tracing::warn!(
                    submission_id = %submission_id,
                    error = %e,
                    "artifact store unavailable, continuing without artifact hash"
                ),
            }
        }

        let now = Utc::now();
        let created_at = self
            .store
            .get_submission(&submission_id)?
            .map(|existing| existing.created_at);
        let submission = event.into_submission(created_at, now);
        self.store.put_submission(&submission)?;

        tracing::info!(
            submission_id = %submission.id,
            holder = %submission.holder,
            skill = %submission.skill,
            "submission approved"
        );
        Ok(submission)
    }

    /// Issue the credential for an approved submission.
    pub async fn issue(&self, submission_id: &SubmissionId) -> Result<IssueOutcome, IssueError> {
        let submission = self
            .store
            .get_submission(submission_id)?
            .ok_or_else(|| IssueError::SubmissionNotFound(submission_id.clone()))?;
        if submission.review_status != ReviewStatus::Approved {
            return Err(IssueError::NotApproved {
                submission_id: submission_id.clone(),
                status: submission.review_status,
            });
        }

        let now = Utc::now();
        match self
            .store
            .claim_mirror(LocalCredentialMirror::pending(&submission, now))?
        {
            ClaimOutcome::Created(_) => {
                tracing::debug!(submission_id = %submission_id, "mirror row claimed");
            }
            ClaimOutcome::Existing(row) => match row.status {
                MirrorStatus::Mirrored => return self.already_issued(row).await,
                MirrorStatus::LedgerConfirmedUnmirrored => return self.finish_confirmed(row).await,
                MirrorStatus::MirrorFailed | MirrorStatus::Orphaned => {
                    let mut reopened = false;
                    self.store
                        .update_mirror(submission_id, &mut |row: &mut LocalCredentialMirror| {
                            // A concurrent caller may have reopened the row first.
                            if !row.status.is_failed() {
                                return Ok(());
                            }
                            row.retry(now)?;
                            row.holder = submission.holder.clone();
                            row.skill = submission.skill.clone();
                            row.artifact_hash = submission.artifact_ref.clone();
                            reopened = true;
                            Ok(())
                        })?;
                    if reopened {
                        tracing::info!(submission_id = %submission_id, "retrying failed issuance");
                    }
                }
                MirrorStatus::PendingLedgerWrite => {}
            },
        }

        let Some(row) =
            self.store
                .try_begin_attempt(submission_id, self.config.lease_length(), now)?
        else {
            return Err(IssueError::InFlight(submission_id.clone()));
        };

        let this = self.clone();
        tokio::spawn(async move { this.attempt(row).await })
            .await
            .map_err(|e| IssueError::LedgerUnavailable(format!("issuance task failed: {e}")))?
    }

    /// Issuance state of a submission.
    pub fn issuance_view(&self, submission_id: &SubmissionId) -> Result<IssuanceView, IssueError> {
        let submission = self
            .store
            .get_submission(submission_id)?
            .ok_or_else(|| IssueError::SubmissionNotFound(submission_id.clone()))?;
        Ok(match self.store.get_mirror(submission_id)? {
            Some(row) => row.issuance_view(),
            None => IssuanceView::unissued(&submission),
        })
    }

    /// Revoke a credential on the ledger, then refresh the local copy.
    pub async fn revoke(&self, credential_id: &CredentialId) -> Result<(), RevokeError> {
        let timeout = self.config.ledger_timeout();
        match bounded(timeout, self.ledger.revoke(credential_id, &self.issuer)).await {
            Ok(()) => {}
            Err(LedgerError::NotFound(id)) => return Err(RevokeError::NotFound(id)),
            Err(e) if e.is_indeterminate() => {
                return Err(RevokeError::LedgerUnavailable(e.to_string()))
            }
            Err(e) => return Err(RevokeError::Rejected(e.to_string())),
        }
        tracing::warn!(
            target: "skillcred::audit",
            credential_id = %credential_id,
            issuer = %self.issuer,
            "credential revoked"
        );

        let now = Utc::now();
        let refreshed = self.store.mirror_by_ledger_id(credential_id).and_then(|row| {
            let Some(row) = row.filter(|row| row.active.is_some()) else {
                return Ok(None);
            };
            self.store
                .update_mirror(&row.submission_id, &mut |row: &mut LocalCredentialMirror| {
                    row.active = Some(false);
                    row.updated_at = now;
                    row.last_reconciled_at = Some(now);
                    Ok(())
                })
                .map(Some)
        });
        if let Err(e) = refreshed {
            tracing::warn!(
                credential_id = %credential_id,
                error = %e,
                "revoked on ledger but local mirror not refreshed"
            );
        }
        Ok(())
    }

    async fn attempt(self, row: LocalCredentialMirror) -> Result<IssueOutcome, IssueError> {
        let submission_id = row.submission_id.clone();
        let timeout = self.config.ledger_timeout();

        // A previous attempt may have landed without us hearing about it.
        if row.attempts > 1 {
            match bounded(timeout, self.ledger.find_by_idempotency_key(&row.idempotency_key)).await
            {
                Ok(Some(record)) => {
                    tracing::info!(
                        submission_id = %submission_id,
                        credential_id = %record.id,
                        "earlier ledger write found, not writing again"
                    );
                    return Ok(self.finish(&submission_id, record, None));
                }
                Ok(None) => {}
                Err(e) => return Err(self.indeterminate(&submission_id, e)),
            }
        }

        match bounded(timeout, self.ledger.is_authorized_issuer(&self.issuer)).await {
            Ok(true) => {}
            Ok(false) => return Err(self.reject(&submission_id, "unauthorized issuer")),
            Err(e) => {
                self.release(&submission_id);
                return Err(IssueError::LedgerUnavailable(e.to_string()));
            }
        }

        let request = IssueRequest {
            holder: row.holder.clone(),
            skill: row.skill.clone(),
            artifact_hash: row.artifact_hash.clone(),
            metadata: IssueMetadata {
                idempotency_key: row.idempotency_key.clone(),
                submission_id: submission_id.clone(),
                issuer: self.issuer.clone(),
            },
        };
        // The checks above took time; make sure no later attempt has taken
        // the row over before anything is written.
        let renewed = self.store.renew_lease(
            &submission_id,
            row.attempts,
            self.config.write_lease_length(),
            Utc::now(),
        );
        match renewed {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(
                    submission_id = %submission_id,
                    attempt = row.attempts,
                    "attempt lease lost before dispatch, not writing"
                );
                return Err(IssueError::InFlight(submission_id));
            }
            Err(e) => {
                self.release(&submission_id);
                return Err(IssueError::Store(e));
            }
        }

        tracing::info!(
            submission_id = %submission_id,
            attempt = row.attempts,
            "dispatching ledger write"
        );

        match bounded(timeout, self.ledger.issue(request.clone())).await {
            Ok(receipt) => self.confirmed(&request, receipt).await,
            Err(e) if e.is_indeterminate() => Err(self.indeterminate(&submission_id, e)),
            Err(LedgerError::Duplicate(reason)) => self.resolve_duplicate(&row, reason).await,
            Err(e) => Err(self.reject(&submission_id, e.to_string())),
        }
    }

    async fn confirmed(
        &self,
        request: &IssueRequest,
        receipt: IssueReceipt,
    ) -> Result<IssueOutcome, IssueError> {
        let submission_id = &request.metadata.submission_id;
        let now = Utc::now();
        tracing::info!(
            submission_id = %submission_id,
            credential_id = %receipt.credential_id,
            tx_ref = %receipt.tx_ref,
            "ledger confirmed credential"
        );

        let persisted = self
            .store
            .update_mirror(submission_id, &mut |row: &mut LocalCredentialMirror| {
                row.confirm(receipt.credential_id.clone(), Some(receipt.tx_ref.clone()), now)?;
                row.issuer = Some(request.metadata.issuer.clone());
                Ok(())
            });
        if let Err(e) = &persisted {
            tracing::warn!(
                submission_id = %submission_id,
                error = %e,
                "could not persist ledger confirmation"
            );
        }

        let read_back = bounded(
            self.config.ledger_timeout(),
            self.ledger.get_credential(&receipt.credential_id),
        )
        .await;
        match read_back {
            Ok(Some(record)) => Ok(self.finish(submission_id, record, Some(receipt.tx_ref))),
            Ok(None) => {
                tracing::warn!(
                    submission_id = %submission_id,
                    credential_id = %receipt.credential_id,
                    "ledger confirmed a write it cannot read back"
                );
                Err(IssueError::IndeterminateLedgerResponse {
                    submission_id: submission_id.clone(),
                    reason: format!(
                        "ledger has no record of confirmed credential {}",
                        receipt.credential_id
                    ),
                })
            }
            Err(e) => {
                // Only ledger data may be mirrored; the sweeper reads it later.
                tracing::warn!(
                    submission_id = %submission_id,
                    credential_id = %receipt.credential_id,
                    error = %e,
                    "ledger read-back failed, credential left unmirrored"
                );
                Ok(IssueOutcome::Issued {
                    record: CredentialRecord {
                        id: receipt.credential_id.clone(),
                        holder: request.holder.clone(),
                        issuer: request.metadata.issuer.clone(),
                        skill: request.skill.clone(),
                        artifact_hash: request.artifact_hash.clone(),
                        issued_at: now,
                        active: true,
                        idempotency_key: Some(request.metadata.idempotency_key.clone()),
                    },
                    mirror_status: persisted
                        .map(|row| row.status)
                        .unwrap_or(MirrorStatus::PendingLedgerWrite),
                    tx_ref: Some(receipt.tx_ref),
                })
            }
        }
    }

    fn finish(
        &self,
        submission_id: &SubmissionId,
        record: CredentialRecord,
        tx_ref: Option<TxRef>,
    ) -> IssueOutcome {
        let mirror_status = match write_mirror(self.store.as_ref(), submission_id, &record, Utc::now())
        {
            Ok(row) => row.status,
            Err(failure) => {
                log_mirror_failure(&failure);
                MirrorStatus::LedgerConfirmedUnmirrored
            }
        };
        IssueOutcome::Issued {
            record,
            mirror_status,
            tx_ref,
        }
    }

    async fn resolve_duplicate(
        &self,
        row: &LocalCredentialMirror,
        reason: String,
    ) -> Result<IssueOutcome, IssueError> {
        let submission_id = &row.submission_id;
        let lookup = bounded(
            self.config.ledger_timeout(),
            self.ledger.find_by_idempotency_key(&row.idempotency_key),
        )
        .await;
        match lookup {
            Ok(Some(record)) => Ok(self.finish(submission_id, record, None)),
            Ok(None) => Err(self.reject(submission_id, format!("duplicate: {reason}"))),
            Err(e) => Err(self.indeterminate(submission_id, e)),
        }
    }

    async fn already_issued(&self, row: LocalCredentialMirror) -> Result<IssueOutcome, IssueError> {
        if let Some(record) = row.cached_record() {
            return Ok(IssueOutcome::AlreadyIssued { record });
        }
        self.finish_confirmed(row).await
    }

    /// The ledger already holds the credential; read it back and mirror it.
    async fn finish_confirmed(
        &self,
        row: LocalCredentialMirror,
    ) -> Result<IssueOutcome, IssueError> {
        let submission_id = row.submission_id.clone();
        let Some(ledger_id) = row.ledger_id.clone() else {
            return Err(IssueError::IndeterminateLedgerResponse {
                submission_id,
                reason: "confirmed row has no ledger id".into(),
            });
        };

        let read = bounded(self.config.ledger_timeout(), self.ledger.get_credential(&ledger_id)).await;
        match read {
            Ok(Some(record)) => {
                if let Err(failure) =
                    write_mirror(self.store.as_ref(), &submission_id, &record, Utc::now())
                {
                    log_mirror_failure(&failure);
                }
                Ok(IssueOutcome::AlreadyIssued { record })
            }
            Ok(None) => Err(IssueError::IndeterminateLedgerResponse {
                submission_id,
                reason: format!("ledger has no record of credential {ledger_id}"),
            }),
            Err(e) => Err(IssueError::LedgerUnavailable(e.to_string())),
        }
    }

    fn indeterminate(&self, submission_id: &SubmissionId, error: LedgerError) -> IssueError {
        self.release(submission_id);
        tracing::warn!(
            submission_id = %submission_id,
            error = %error,
            "ledger outcome unknown, row left pending"
        );
        IssueError::IndeterminateLedgerResponse {
            submission_id: submission_id.clone(),
            reason: error.to_string(),
        }
    }

    fn reject(&self, submission_id: &SubmissionId, reason: impl Into<String>) -> IssueError {
        let reason = reason.into();
        let now = Utc::now();
        if let Err(e) = self
            .store
            .update_mirror(submission_id, &mut |row: &mut LocalCredentialMirror| {
                row.reject(reason.clone(), now)
            })
        {
            tracing::warn!(submission_id = %submission_id, error = %e, "could not record rejection");
        }
        tracing::warn!(
            target: "skillcred::audit",
            submission_id = %submission_id,
            reason = %reason,
            "issuance rejected by ledger, mirror_failed"
        );
        IssueError::LedgerRejected {
            submission_id: submission_id.clone(),
            reason,
        }
    }

    fn release(&self, submission_id: &SubmissionId) {
        if let Err(e) = self.store.release_lease(submission_id, Utc::now()) {
            tracing::warn!(submission_id = %submission_id, error = %e, "could not release attempt lease");
        }
    }
}
