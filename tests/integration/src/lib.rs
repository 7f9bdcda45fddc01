//! Test doubles and fixtures for cross-crate lifecycle tests.
//!
//! `FlakyLedger` and `FlakyStore` wrap the real in-memory backends and can
//! be switched into the failure modes the lifecycle has to survive.

pub mod gateway;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use skillcred_core::{
    ApprovedSubmission, CoreError, CredentialId, CredentialRecord, HolderId, IdempotencyKey,
    IssuerId, LifecycleConfig, LocalCredentialMirror, MirrorStatus, Submission, SubmissionId,
};
use skillcred_credentials::{
    IssuanceOrchestrator, ReconciliationSweeper, StaleSignal, VerificationResolver,
};
use skillcred_index::{ClaimOutcome, IndexError, IndexStore, MemoryIndexStore};
use skillcred_ledger::{IssueReceipt, IssueRequest, LedgerClient, LedgerError, MemoryLedger};

pub const ISSUER: &str = "0xissuer";
pub const HOLDER: &str = "0xholder";

// =========================================================================
// Ledger double
// =========================================================================

/// In-memory ledger with switchable outages.
#[derive(Default)]
pub struct FlakyLedger {
    pub inner: MemoryLedger,
    offline: AtomicBool,
    lose_write_responses: AtomicBool,
    write_delay_ms: AtomicU64,
    issue_calls: AtomicU64,
    key_lookups: AtomicU64,
}

impl FlakyLedger {
    pub fn new() -> Self {
        let ledger = Self::default();
        ledger.inner.authorize_issuer(IssuerId::new(ISSUER));
        ledger
    }

    /// Every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Writes land on the ledger, but the response never arrives in time.
    pub fn set_lose_write_responses(&self, lose: bool) {
        self.lose_write_responses.store(lose, Ordering::SeqCst);
    }

    /// Delay every write before it reaches the ledger.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `issue` calls received, including failed ones.
    pub fn issue_calls(&self) -> u64 {
        self.issue_calls.load(Ordering::SeqCst)
    }

    /// Number of lookups by idempotency key.
    pub fn key_lookups(&self) -> u64 {
        self.key_lookups.load(Ordering::SeqCst)
    }

    /// Number of credentials actually written.
    pub fn writes(&self) -> u64 {
        self.inner.write_count()
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Network("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for FlakyLedger {
    async fn issue(&self, request: IssueRequest) -> Result<IssueReceipt, LedgerError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let receipt = self.inner.issue(request).await?;
        if self.lose_write_responses.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        Ok(receipt)
    }

    async fn get_credential(
        &self,
        id: &CredentialId,
    ) -> Result<Option<CredentialRecord>, LedgerError> {
        self.check()?;
        self.inner.get_credential(id).await
    }

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<CredentialRecord>, LedgerError> {
        self.key_lookups.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.find_by_idempotency_key(key).await
    }

    async fn credentials_for_holder(
        &self,
        holder: &HolderId,
    ) -> Result<Vec<CredentialRecord>, LedgerError> {
        self.check()?;
        self.inner.credentials_for_holder(holder).await
    }

    async fn is_authorized_issuer(&self, issuer: &IssuerId) -> Result<bool, LedgerError> {
        self.check()?;
        self.inner.is_authorized_issuer(issuer).await
    }

    async fn revoke(&self, id: &CredentialId, issuer: &IssuerId) -> Result<(), LedgerError> {
        self.check()?;
        self.inner.revoke(id, issuer).await
    }

    fn backend_id(&self) -> &str {
        "ledger-flaky"
    }
}

// =========================================================================
// Store double
// =========================================================================

const HEALTHY: u8 = 0;
const REFUSE_MIRROR_WRITES: u8 = 1;
const DOWN: u8 = 2;

/// Index store wrapper that can go down entirely, or refuse only the
/// update that would make a row `mirrored`.
pub struct FlakyStore {
    inner: Arc<dyn IndexStore>,
    mode: AtomicU8,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn IndexStore>) -> Self {
        Self {
            inner,
            mode: AtomicU8::new(HEALTHY),
        }
    }

    pub fn heal(&self) {
        self.mode.store(HEALTHY, Ordering::SeqCst);
    }

    pub fn refuse_mirror_writes(&self) {
        self.mode.store(REFUSE_MIRROR_WRITES, Ordering::SeqCst);
    }

    pub fn go_down(&self) {
        self.mode.store(DOWN, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), IndexError> {
        if self.mode.load(Ordering::SeqCst) == DOWN {
            return Err(IndexError::Unavailable("store offline".into()));
        }
        Ok(())
    }
}

impl IndexStore for FlakyStore {
    fn put_submission(&self, submission: &Submission) -> Result<(), IndexError> {
        self.check()?;
        self.inner.put_submission(submission)
    }

    fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, IndexError> {
        self.check()?;
        self.inner.get_submission(id)
    }

    fn claim_mirror(&self, mirror: LocalCredentialMirror) -> Result<ClaimOutcome, IndexError> {
        self.check()?;
        self.inner.claim_mirror(mirror)
    }

    fn get_mirror(&self, id: &SubmissionId) -> Result<Option<LocalCredentialMirror>, IndexError> {
        self.check()?;
        self.inner.get_mirror(id)
    }

    fn update_mirror(
        &self,
        id: &SubmissionId,
        apply: &mut dyn FnMut(&mut LocalCredentialMirror) -> Result<(), CoreError>,
    ) -> Result<LocalCredentialMirror, IndexError> {
        self.check()?;
        if self.mode.load(Ordering::SeqCst) != REFUSE_MIRROR_WRITES {
            return self.inner.update_mirror(id, apply);
        }

        let mut refused = false;
        let result = self
            .inner
            .update_mirror(id, &mut |row: &mut LocalCredentialMirror| {
                let was_mirrored = row.status == MirrorStatus::Mirrored;
                apply(row)?;
                if !was_mirrored && row.status == MirrorStatus::Mirrored {
                    refused = true;
                    return Err(CoreError::ValidationError("mirror write refused".into()));
                }
                Ok(())
            });
        if refused {
            return Err(IndexError::Unavailable("store offline during mirror write".into()));
        }
        result
    }

    fn mirror_by_ledger_id(
        &self,
        id: &CredentialId,
    ) -> Result<Option<LocalCredentialMirror>, IndexError> {
        self.check()?;
        self.inner.mirror_by_ledger_id(id)
    }

    fn mirrors_for_holder(
        &self,
        holder: &HolderId,
    ) -> Result<Vec<LocalCredentialMirror>, IndexError> {
        self.check()?;
        self.inner.mirrors_for_holder(holder)
    }

    fn mirrors_with_status(
        &self,
        status: MirrorStatus,
    ) -> Result<Vec<LocalCredentialMirror>, IndexError> {
        self.check()?;
        self.inner.mirrors_with_status(status)
    }
}

// =========================================================================
// Fixture
// =========================================================================

/// Lifecycle configuration with a short ledger timeout for tests.
pub fn test_config() -> LifecycleConfig {
    LifecycleConfig {
        ledger_timeout_ms: 250,
        ..LifecycleConfig::default()
    }
}

/// The three lifecycle services wired around a flaky ledger and store.
pub struct Fixture {
    pub ledger: Arc<FlakyLedger>,
    pub store: Arc<FlakyStore>,
    pub stale: Arc<StaleSignal>,
    pub config: LifecycleConfig,
    pub orchestrator: IssuanceOrchestrator,
    pub resolver: VerificationResolver,
    pub sweeper: ReconciliationSweeper,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(FlakyLedger::new()),
            Arc::new(MemoryIndexStore::new()),
        )
    }

    pub fn with_parts(ledger: Arc<FlakyLedger>, store: Arc<dyn IndexStore>) -> Self {
        let store = Arc::new(FlakyStore::new(store));
        let stale = Arc::new(StaleSignal::new());
        let config = test_config();
        let orchestrator = IssuanceOrchestrator::new(
            IssuerId::new(ISSUER),
            ledger.clone(),
            store.clone(),
            config.clone(),
        );
        let resolver = VerificationResolver::new(
            ledger.clone(),
            store.clone(),
            config.clone(),
            stale.clone(),
        );
        let sweeper = ReconciliationSweeper::new(
            ledger.clone(),
            store.clone(),
            config.clone(),
            stale.clone(),
        );
        Self {
            ledger,
            store,
            stale,
            config,
            orchestrator,
            resolver,
            sweeper,
        }
    }

    /// Record an approved submission for the test holder.
    pub async fn approve(&self, submission: &str) -> Submission {
        self.orchestrator
            .record_approval(
                ApprovedSubmission {
                    submission_id: SubmissionId::new(submission),
                    holder: HolderId::new(HOLDER),
                    skill: "distributed-systems".into(),
                    artifact_ref: None,
                    reviewer: Some("reviewer-1".into()),
                    review_notes: Some("solid work".into()),
                },
                None,
            )
            .await
            .expect("approval recorded")
    }

    pub fn mirror(&self, submission: &str) -> LocalCredentialMirror {
        self.store
            .get_mirror(&SubmissionId::new(submission))
            .expect("store readable")
            .expect("mirror row exists")
    }

    /// Push a row's timestamps into the past, as if the process had been
    /// idle for `secs` seconds.
    pub fn age_mirror(&self, submission: &str, secs: i64) {
        let then = Utc::now() - chrono::Duration::seconds(secs);
        self.store
            .update_mirror(
                &SubmissionId::new(submission),
                &mut |row: &mut LocalCredentialMirror| {
                    row.updated_at = then;
                    if row.last_reconciled_at.is_some() {
                        row.last_reconciled_at = Some(then);
                    }
                    if row.lease_until.is_some() {
                        row.lease_until = Some(then);
                    }
                    Ok(())
                },
            )
            .expect("mirror aged");
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
