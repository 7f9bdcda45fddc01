//! Shared fixtures for the lifecycle unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use skillcred_core::{
    ApprovedSubmission, CredentialId, CredentialRecord, HolderId, IdempotencyKey, IssuerId,
    LifecycleConfig, SubmissionId,
};
use skillcred_index::MemoryIndexStore;
use skillcred_ledger::{IssueReceipt, IssueRequest, LedgerClient, LedgerError, MemoryLedger};

use crate::orchestrator::IssuanceOrchestrator;
use crate::resolver::VerificationResolver;
use crate::stale::StaleSignal;
use crate::sweeper::ReconciliationSweeper;

pub(crate) const ISSUER: &str = "0xissuer";

const READS_OK: u8 = 0;
const READS_FAIL: u8 = 1;
const READS_EMPTY: u8 = 2;

/// Memory ledger that can drop offline, lose write responses, answer
/// slowly, or misbehave on credential reads.
#[derive(Default)]
pub(crate) struct TestLedger {
    pub inner: MemoryLedger,
    offline: AtomicBool,
    lose_write_responses: AtomicBool,
    call_delay_ms: AtomicU64,
    reads: AtomicU8,
    issue_calls: AtomicU64,
}

impl TestLedger {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Writes still land, but the caller never hears back in time.
    pub fn set_lose_write_responses(&self, lose: bool) {
        self.lose_write_responses.store(lose, Ordering::SeqCst);
    }

    /// Delay the issuer check and the write by `delay` each.
    pub fn set_call_delay(&self, delay: Duration) {
        self.call_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// `get_credential` fails with a network error.
    pub fn set_reads_failing(&self) {
        self.reads.store(READS_FAIL, Ordering::SeqCst);
    }

    /// `get_credential` answers that the credential does not exist.
    pub fn set_reads_empty(&self) {
        self.reads.store(READS_EMPTY, Ordering::SeqCst);
    }

    pub fn set_reads_ok(&self) {
        self.reads.store(READS_OK, Ordering::SeqCst);
    }

    /// Number of `issue` calls that reached the ledger.
    pub fn issue_calls(&self) -> u64 {
        self.issue_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = self.call_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Network("ledger offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for TestLedger {
    async fn issue(&self, request: IssueRequest) -> Result<IssueReceipt, LedgerError> {
        self.check()?;
        self.pause().await;
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        let receipt = self.inner.issue(request).await?;
        if self.lose_write_responses.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        Ok(receipt)
    }

    async fn get_credential(
        &self,
        id: &CredentialId,
    ) -> Result<Option<CredentialRecord>, LedgerError> {
        self.check()?;
        match self.reads.load(Ordering::SeqCst) {
            READS_FAIL => Err(LedgerError::Network("read replica down".into())),
            READS_EMPTY => Ok(None),
            _ => self.inner.get_credential(id).await,
        }
    }

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<CredentialRecord>, LedgerError> {
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
        self.pause().await;
        self.inner.is_authorized_issuer(issuer).await
    }

    async fn revoke(&self, id: &CredentialId, issuer: &IssuerId) -> Result<(), LedgerError> {
        self.check()?;
        self.inner.revoke(id, issuer).await
    }

    fn backend_id(&self) -> &str {
        "ledger-test"
    }
}

pub(crate) struct Harness {
    pub ledger: Arc<TestLedger>,
    pub store: Arc<MemoryIndexStore>,
    pub stale: Arc<StaleSignal>,
    pub config: LifecycleConfig,
    pub orchestrator: IssuanceOrchestrator,
    pub resolver: VerificationResolver,
    pub sweeper: ReconciliationSweeper,
}

pub(crate) fn config() -> LifecycleConfig {
    LifecycleConfig {
        ledger_timeout_ms: 200,
        ..LifecycleConfig::default()
    }
}

pub(crate) fn harness() -> Harness {
    let ledger = Arc::new(TestLedger::default());
    ledger.inner.authorize_issuer(IssuerId::new(ISSUER));
    let store = Arc::new(MemoryIndexStore::new());
    let stale = Arc::new(StaleSignal::new());
    let config = config();

    let orchestrator = IssuanceOrchestrator::new(
        IssuerId::new(ISSUER),
        ledger.clone(),
        store.clone(),
        config.clone(),
    );
    let resolver =
        VerificationResolver::new(ledger.clone(), store.clone(), config.clone(), stale.clone());
    let sweeper =
        ReconciliationSweeper::new(ledger.clone(), store.clone(), config.clone(), stale.clone());

    Harness {
        ledger,
        store,
        stale,
        config,
        orchestrator,
        resolver,
        sweeper,
    }
}

pub(crate) fn approved(submission: &str) -> ApprovedSubmission {
    ApprovedSubmission {
        submission_id: SubmissionId::new(submission),
        holder: HolderId::new("0xholder"),
        skill: "rust-async".into(),
        artifact_ref: None,
        reviewer: Some("rev-1".into()),
        review_notes: None,
    }
}
