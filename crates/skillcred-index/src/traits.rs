use chrono::{DateTime, Duration, Utc};

use skillcred_core::{
    CoreError, CredentialId, HolderId, LocalCredentialMirror, MirrorStatus, Submission,
    SubmissionId,
};

use crate::error::IndexError;

/// Result of claiming a mirror row for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// No row existed; the given row was inserted.
    Created(LocalCredentialMirror),
    /// A row already existed (the uniqueness gate); it is returned unchanged.
    Existing(LocalCredentialMirror),
}

/// Local index store.
///
/// Mirror rows are unique per submission id. `claim_mirror` is an
/// insert-if-absent and `update_mirror` a read-modify-write, both atomic
/// per row, so concurrent writers to the same submission serialize here.
pub trait IndexStore: Send + Sync {
    /// Upsert a submission by id.
    fn put_submission(&self, submission: &Submission) -> Result<(), IndexError>;

    fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, IndexError>;

    /// Insert the row unless one already exists for its submission.
    fn claim_mirror(&self, mirror: LocalCredentialMirror) -> Result<ClaimOutcome, IndexError>;

    fn get_mirror(&self, id: &SubmissionId) -> Result<Option<LocalCredentialMirror>, IndexError>;

    /// Atomically apply `apply` to the stored row and persist the result.
    ///
    /// If `apply` fails the stored row is left untouched.
    fn update_mirror(
        &self,
        id: &SubmissionId,
        apply: &mut dyn FnMut(&mut LocalCredentialMirror) -> Result<(), CoreError>,
    ) -> Result<LocalCredentialMirror, IndexError>;

    fn mirror_by_ledger_id(
        &self,
        id: &CredentialId,
    ) -> Result<Option<LocalCredentialMirror>, IndexError>;

    fn mirrors_for_holder(&self, holder: &HolderId)
        -> Result<Vec<LocalCredentialMirror>, IndexError>;

    fn mirrors_with_status(
        &self,
        status: MirrorStatus,
    ) -> Result<Vec<LocalCredentialMirror>, IndexError>;

    /// Take the attempt lease on a pending row.
    ///
    /// Returns the leased row, or `None` if the row is not pending or
    /// another attempt holds an unexpired lease.
    fn try_begin_attempt(
        &self,
        id: &SubmissionId,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<LocalCredentialMirror>, IndexError> {
        let mut acquired = false;
        let row = self.update_mirror(id, &mut |row: &mut LocalCredentialMirror| {
            acquired = row.status == MirrorStatus::PendingLedgerWrite && !row.lease_active(now);
            if acquired {
                row.extend_lease(lease, now);
                row.attempts += 1;
            }
            Ok(())
        })?;
        Ok(acquired.then_some(row))
    }

    /// Re-confirm that attempt number `attempt` still owns the row and
    /// extend its lease to at least `now + lease`.
    ///
    /// Returns `None` when the lease expired, another attempt took the row
    /// over, or the row left `pending_ledger_write`.
    fn renew_lease(
        &self,
        id: &SubmissionId,
        attempt: u32,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<LocalCredentialMirror>, IndexError> {
        let mut owned = false;
        let row = self.update_mirror(id, &mut |row: &mut LocalCredentialMirror| {
            owned = row.status == MirrorStatus::PendingLedgerWrite
                && row.attempts == attempt
                && row.lease_active(now);
            if owned {
                let current = row.lease_until;
                row.extend_lease(lease, now);
                row.lease_until = row.lease_until.max(current);
            }
            Ok(())
        })?;
        Ok(owned.then_some(row))
    }

    /// Drop the attempt lease so the next caller can look up the outcome.
    fn release_lease(
        &self,
        id: &SubmissionId,
        now: DateTime<Utc>,
    ) -> Result<LocalCredentialMirror, IndexError> {
        self.update_mirror(id, &mut |row: &mut LocalCredentialMirror| {
            row.lease_until = None;
            row.updated_at = now;
            Ok(())
        })
    }

    /// Number of rows per status, in lifecycle order.
    fn status_counts(&self) -> Result<Vec<(MirrorStatus, usize)>, IndexError> {
        MirrorStatus::ALL
            .iter()
            .map(|s| Ok((*s, self.mirrors_with_status(*s)?.len())))
            .collect()
    }
}
