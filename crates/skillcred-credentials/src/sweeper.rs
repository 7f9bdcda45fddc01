use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use skillcred_core::{
    CredentialRecord, LifecycleConfig, LocalCredentialMirror, MirrorStatus, SubmissionId,
};
use skillcred_index::IndexStore;
use skillcred_ledger::{LedgerClient, LedgerError};

use crate::ledger_call::bounded;
use crate::mirror_writer::{log_mirror_failure, write_mirror};
use crate::stale::StaleSignal;

/// What one sweep cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Rows that were due and looked at.
    pub examined: usize,
    /// Rows brought to `mirrored` from another state.
    pub mirrored: usize,
    /// Rows downgraded because the ledger definitively lacks the credential.
    pub orphaned: usize,
    /// Mirrored rows re-read from the ledger.
    pub refreshed: usize,
    /// Pending rows with no credential on the ledger, left for a manual retry.
    pub left_pending: usize,
    /// Ledger or store errors; affected rows were left as they were.
    pub transient_errors: usize,
}

impl SweepReport {
    pub fn changed_anything(&self) -> bool {
        self.mirrored + self.orphaned + self.refreshed > 0
    }
}

/// Periodic repair of ledger/mirror divergence.
///
/// Each cycle runs three phases over rows that are due:
/// 1. `ledger_confirmed_unmirrored` and `mirror_failed` rows older than the
///    grace period are re-read from the ledger and mirrored.
/// 2. `pending_ledger_write` rows past the pending timeout (and not leased)
///    are looked up by idempotency key.
/// 3. `mirrored` rows flagged stale or past the revalidation age are
///    refreshed.
///
/// Only a definitive "does not exist" from the ledger downgrades a row to
/// `orphaned`. Ledger errors leave rows untouched.
pub struct ReconciliationSweeper {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn IndexStore>,
    config: LifecycleConfig,
    stale: Arc<StaleSignal>,
}

impl ReconciliationSweeper {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn IndexStore>,
        config: LifecycleConfig,
        stale: Arc<StaleSignal>,
    ) -> Self {
        Self {
            ledger,
            store,
            config,
            stale,
        }
    }

    /// Sweep on the configured interval until `shutdown` turns true.
    ///
    /// The first cycle runs immediately, so a cold start repairs whatever
    /// the previous process left behind.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.config.sweep_interval().as_secs(),
            "reconciliation sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.stale.notified() => {
                    tracing::debug!("sweep triggered by stale mirror");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let report = self.sweep_once().await;
            if report.changed_anything() || report.transient_errors > 0 {
                tracing::info!(
                    examined = report.examined,
                    mirrored = report.mirrored,
                    orphaned = report.orphaned,
                    refreshed = report.refreshed,
                    left_pending = report.left_pending,
                    transient_errors = report.transient_errors,
                    "sweep cycle complete"
                );
            } else {
                tracing::debug!(examined = report.examined, "sweep cycle complete");
            }
        }

        tracing::info!("reconciliation sweeper stopped");
    }

    /// Run a single sweep cycle.
    pub async fn sweep_once(&self) -> SweepReport {
        let now = Utc::now();
        let flagged: HashSet<SubmissionId> = self.stale.drain().into_iter().collect();
        let mut report = SweepReport::default();

        for status in [MirrorStatus::LedgerConfirmedUnmirrored, MirrorStatus::MirrorFailed] {
            for row in self.rows(status, &mut report) {
                let due = flagged.contains(&row.submission_id)
                    || older_than(row.updated_at, self.config.grace_period(), now);
                if due {
                    report.examined += 1;
                    self.recover(row, now, &mut report).await;
                }
            }
        }

        for row in self.rows(MirrorStatus::PendingLedgerWrite, &mut report) {
            let due = flagged.contains(&row.submission_id)
                || older_than(row.updated_at, self.config.pending_timeout(), now);
            if due && !row.lease_active(now) {
                report.examined += 1;
                self.resolve_pending(row, now, &mut report).await;
            }
        }

        for row in self.rows(MirrorStatus::Mirrored, &mut report) {
            let due = flagged.contains(&row.submission_id)
                || row
                    .last_reconciled_at
                    .map_or(true, |at| older_than(at, self.config.revalidate_after(), now));
            if due {
                report.examined += 1;
                self.revalidate(row, now, &mut report).await;
            }
        }

        report
    }

    fn rows(&self, status: MirrorStatus, report: &mut SweepReport) -> Vec<LocalCredentialMirror> {
        match self.store.mirrors_with_status(status) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(status = %status, error = %e, "could not list mirror rows");
                report.transient_errors += 1;
                Vec::new()
            }
        }
    }

    /// Phase 1: the ledger accepted (or may have accepted) the write.
    async fn recover(&self, row: LocalCredentialMirror, now: DateTime<Utc>, report: &mut SweepReport) {
        let lookup = match &row.ledger_id {
            Some(id) => bounded(self.config.ledger_timeout(), self.ledger.get_credential(id)).await,
            None => {
                bounded(
                    self.config.ledger_timeout(),
                    self.ledger.find_by_idempotency_key(&row.idempotency_key),
                )
                .await
            }
        };

        match lookup {
            Ok(Some(record)) => {
                if self.mirror(&row.submission_id, &record, now, report) {
                    report.mirrored += 1;
                }
            }
            Ok(None) if row.status == MirrorStatus::LedgerConfirmedUnmirrored => {
                self.orphan(&row, now, report);
            }
            Ok(None) => {
                tracing::debug!(submission_id = %row.submission_id, "no ledger credential for failed row");
            }
            Err(e) => self.transient(&row, e, report),
        }
    }

    /// Phase 2: an attempt whose outcome was never learned.
    async fn resolve_pending(
        &self,
        row: LocalCredentialMirror,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        let leased = self
            .store
            .try_begin_attempt(&row.submission_id, self.config.lease_length(), now);
        let row = match leased {
            Ok(Some(row)) => row,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(submission_id = %row.submission_id, error = %e, "could not lease pending row");
                report.transient_errors += 1;
                return;
            }
        };

        let lookup = bounded(
            self.config.ledger_timeout(),
            self.ledger.find_by_idempotency_key(&row.idempotency_key),
        )
        .await;
        match lookup {
            Ok(Some(record)) => {
                if self.mirror(&row.submission_id, &record, now, report) {
                    report.mirrored += 1;
                    return;
                }
            }
            Ok(None) => {
                tracing::info!(
                    submission_id = %row.submission_id,
                    attempts = row.attempts,
                    "no ledger credential for pending row, left for retry"
                );
                report.left_pending += 1;
            }
            Err(e) => self.transient(&row, e, report),
        }

        if let Err(e) = self.store.release_lease(&row.submission_id, Utc::now()) {
            tracing::warn!(submission_id = %row.submission_id, error = %e, "could not release attempt lease");
        }
    }

    /// Phase 3: re-read a mirrored credential.
    async fn revalidate(&self, row: LocalCredentialMirror, now: DateTime<Utc>, report: &mut SweepReport) {
        let Some(id) = row.ledger_id.clone() else {
            return;
        };
        match bounded(self.config.ledger_timeout(), self.ledger.get_credential(&id)).await {
            Ok(Some(record)) => {
                if row.disagrees_with(&record) {
                    tracing::info!(
                        submission_id = %row.submission_id,
                        credential_id = %id,
                        active = record.active,
                        "refreshing stale mirror from ledger"
                    );
                }
                if self.mirror(&row.submission_id, &record, now, report) {
                    report.refreshed += 1;
                }
            }
            Ok(None) => self.orphan(&row, now, report),
            Err(e) => self.transient(&row, e, report),
        }
    }

    fn mirror(
        &self,
        submission_id: &SubmissionId,
        record: &CredentialRecord,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> bool {
        match write_mirror(self.store.as_ref(), submission_id, record, now) {
            Ok(_) => true,
            Err(failure) => {
                log_mirror_failure(&failure);
                report.transient_errors += 1;
                false
            }
        }
    }

    fn orphan(&self, row: &LocalCredentialMirror, now: DateTime<Utc>, report: &mut SweepReport) {
        let result = self
            .store
            .update_mirror(&row.submission_id, &mut |row: &mut LocalCredentialMirror| {
                row.orphan(now)
            });
        match result {
            Ok(_) => {
                tracing::warn!(
                    target: "skillcred::audit",
                    submission_id = %row.submission_id,
                    credential_id = ?row.ledger_id,
                    from = %row.status,
                    "ledger reports credential does not exist, mirror orphaned"
                );
                report.orphaned += 1;
            }
            Err(e) => {
                tracing::warn!(submission_id = %row.submission_id, error = %e, "could not orphan mirror");
                report.transient_errors += 1;
            }
        }
    }

    fn transient(&self, row: &LocalCredentialMirror, error: LedgerError, report: &mut SweepReport) {
        tracing::debug!(
            submission_id = %row.submission_id,
            error = %error,
            "ledger read failed, row left as is"
        );
        report.transient_errors += 1;
    }
}

fn older_than(at: DateTime<Utc>, age: chrono::Duration, now: DateTime<Utc>) -> bool {
    now - at >= age
}
