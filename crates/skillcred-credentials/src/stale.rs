use dashmap::DashSet;
use tokio::sync::Notify;

use skillcred_core::SubmissionId;

/// Mirror rows the resolver caught disagreeing with the ledger.
///
/// The resolver flags rows and wakes the sweeper; the sweeper drains the
/// set at the start of its next cycle.
#[derive(Default)]
pub struct StaleSignal {
    flagged: DashSet<SubmissionId>,
    notify: Notify,
}

impl StaleSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a row and wake the sweeper.
    pub fn flag(&self, submission_id: SubmissionId) {
        if self.flagged.insert(submission_id.clone()) {
            tracing::debug!(submission_id = %submission_id, "mirror flagged stale");
        }
        self.notify.notify_one();
    }

    pub fn is_flagged(&self, submission_id: &SubmissionId) -> bool {
        self.flagged.contains(submission_id)
    }

    /// Take every flagged row.
    pub fn drain(&self) -> Vec<SubmissionId> {
        let ids: Vec<SubmissionId> = self.flagged.iter().map(|e| e.key().clone()).collect();
        for id in &ids {
            self.flagged.remove(id);
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.flagged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flagged.is_empty()
    }

    /// Wait until a row is flagged.
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}
