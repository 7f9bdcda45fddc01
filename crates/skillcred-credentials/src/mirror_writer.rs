use chrono::{DateTime, Utc};

use skillcred_core::{CredentialRecord, LocalCredentialMirror, MirrorStatus, SubmissionId};
use skillcred_index::IndexStore;

use crate::error::MirrorWriteFailed;

/// Copy a ledger record into the submission's mirror row.
///
/// A row still pending (or failed, when the sweeper recovers a write that
/// did land) is confirmed first, so one store update takes it all the way
/// to `mirrored`.
pub(crate) fn write_mirror(
    store: &dyn IndexStore,
    submission_id: &SubmissionId,
    record: &CredentialRecord,
    now: DateTime<Utc>,
) -> Result<LocalCredentialMirror, MirrorWriteFailed> {
    store
        .update_mirror(submission_id, &mut |row: &mut LocalCredentialMirror| {
            if matches!(
                row.status,
                MirrorStatus::PendingLedgerWrite | MirrorStatus::MirrorFailed
            ) {
                row.confirm(record.id.clone(), None, now)?;
            }
            row.mirror_from(record, now)
        })
        .map_err(|source| MirrorWriteFailed {
            submission_id: submission_id.clone(),
            source,
        })
}

/// Log a mirror write the sweeper will have to repair.
pub(crate) fn log_mirror_failure(failure: &MirrorWriteFailed) {
    tracing::warn!(
        submission_id = %failure.submission_id,
        error = %failure.source,
        "credential is on the ledger but the local mirror write failed"
    );
}
