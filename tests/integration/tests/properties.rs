//! Integration test: lifecycle properties under concurrency and failure.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use skillcred_core::{IssuanceState, MirrorStatus, SubmissionId};
use skillcred_credentials::{IssueError, IssueOutcome, ResolveError};
use skillcred_index::{IndexStore, RocksIndexStore};
use skillcred_integration_tests::{FlakyLedger, Fixture};

fn temp_dir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("skillcred_it_{}", rand::random::<u64>()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[tokio::test]
async fn test_sequential_issue_is_idempotent() {
    let f = Fixture::new();
    f.approve("S1").await;

    let first = f.orchestrator.issue(&SubmissionId::new("S1")).await.unwrap();
    let second = f.orchestrator.issue(&SubmissionId::new("S1")).await.unwrap();
    let third = f.orchestrator.issue(&SubmissionId::new("S1")).await.unwrap();

    assert!(matches!(second, IssueOutcome::AlreadyIssued { .. }));
    assert_eq!(first.record().id, second.record().id);
    assert_eq!(second.record(), third.record());
    assert_eq!(f.ledger.writes(), 1);
}

#[tokio::test]
async fn test_concurrent_issue_writes_once() {
    let f = Fixture::new();
    f.approve("S1").await;
    f.ledger.set_write_delay(Duration::from_millis(100));

    let id = SubmissionId::new("S1");
    let calls = (0..8).map(|_| {
        let orchestrator = f.orchestrator.clone();
        let id = id.clone();
        async move { orchestrator.issue(&id).await }
    });
    let results = join_all(calls).await;

    let issued = results
        .iter()
        .filter(|r| matches!(r, Ok(IssueOutcome::Issued { .. })))
        .count();
    assert_eq!(issued, 1);
    for result in &results {
        assert!(matches!(
            result,
            Ok(IssueOutcome::Issued { .. })
                | Ok(IssueOutcome::AlreadyIssued { .. })
                | Err(IssueError::InFlight(_))
        ));
    }
    assert_eq!(f.ledger.writes(), 1);
}

#[tokio::test]
async fn test_no_success_while_ledger_outcome_unknown() {
    let f = Fixture::new();
    f.approve("S1").await;
    f.ledger.set_lose_write_responses(true);

    let result = f.orchestrator.issue(&SubmissionId::new("S1")).await;
    assert!(result.is_err());

    let view = f.orchestrator.issuance_view(&SubmissionId::new("S1")).unwrap();
    assert_eq!(view.state, IssuanceState::Issuing);
    assert!(view.credential_id.is_none());
}

#[tokio::test]
async fn test_cancelled_caller_does_not_cancel_ledger_write() {
    let f = Fixture::new();
    f.approve("S1").await;
    f.ledger.set_write_delay(Duration::from_millis(100));

    let call = f.orchestrator.issue(&SubmissionId::new("S1"));
    let abandoned = tokio::time::timeout(Duration::from_millis(20), call).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(f.ledger.writes(), 1);
    assert_eq!(f.mirror("S1").status, MirrorStatus::Mirrored);
}

#[tokio::test]
async fn test_outage_is_not_reported_as_invalid() {
    let f = Fixture::new();
    f.ledger.set_offline(true);

    let err = f.resolver.resolve("cred:unknown").await.unwrap_err();
    assert!(matches!(err, ResolveError::VerificationUnavailable(_)));

    f.ledger.set_offline(false);
    let err = f.resolver.resolve("cred:unknown").await.unwrap_err();
    assert!(matches!(err, ResolveError::NotFound(_)));
}

#[tokio::test]
async fn test_ledger_down_before_dispatch_writes_nothing() {
    let f = Fixture::new();
    f.approve("S1").await;
    f.ledger.set_offline(true);

    let err = f.orchestrator.issue(&SubmissionId::new("S1")).await.unwrap_err();
    assert!(matches!(err, IssueError::LedgerUnavailable(_)));
    assert_eq!(f.ledger.writes(), 0);

    f.ledger.set_offline(false);
    let outcome = f.orchestrator.issue(&SubmissionId::new("S1")).await.unwrap();
    assert!(matches!(outcome, IssueOutcome::Issued { .. }));
}

#[tokio::test]
async fn test_store_down_before_claim_is_an_error() {
    let f = Fixture::new();
    f.approve("S1").await;
    f.store.go_down();

    let err = f.orchestrator.issue(&SubmissionId::new("S1")).await.unwrap_err();
    assert!(matches!(err, IssueError::Store(_)));
    assert_eq!(f.ledger.issue_calls(), 0);
}

#[tokio::test]
async fn test_sweeper_converges_unmirrored_row() {
    let f = Fixture::new();
    f.approve("S1").await;
    f.store.refuse_mirror_writes();
    f.orchestrator.issue(&SubmissionId::new("S1")).await.unwrap();
    f.store.heal();
    f.age_mirror("S1", 120);

    let report = f.sweeper.sweep_once().await;
    assert_eq!(report.mirrored, 1);
    let row = f.mirror("S1");
    assert_eq!(row.status, MirrorStatus::Mirrored);
    assert!(row.last_reconciled_at.is_some());
}

#[tokio::test]
async fn test_sweeper_resolves_timed_out_pending_row() {
    let f = Fixture::new();
    f.approve("S1").await;
    f.ledger.set_lose_write_responses(true);
    assert!(f.orchestrator.issue(&SubmissionId::new("S1")).await.is_err());
    f.ledger.set_lose_write_responses(false);
    f.age_mirror("S1", 600);

    let report = f.sweeper.sweep_once().await;
    assert_eq!(report.mirrored, 1);
    assert_eq!(f.mirror("S1").status, MirrorStatus::Mirrored);
    assert_eq!(f.ledger.issue_calls(), 1);
}

#[tokio::test]
async fn test_sweeper_keeps_mirror_through_ledger_outage() {
    let f = Fixture::new();
    f.approve("S1").await;
    f.orchestrator.issue(&SubmissionId::new("S1")).await.unwrap();
    f.age_mirror("S1", 7200);
    f.ledger.set_offline(true);

    let report = f.sweeper.sweep_once().await;
    assert_eq!(report.orphaned, 0);
    assert!(report.transient_errors > 0);
    assert_eq!(f.mirror("S1").status, MirrorStatus::Mirrored);
}

#[tokio::test]
async fn test_sweeper_repairs_after_restart() {
    let dir = temp_dir();
    let ledger = Arc::new(FlakyLedger::new());

    {
        let store: Arc<dyn IndexStore> = Arc::new(RocksIndexStore::open(&dir).unwrap());
        let f = Fixture::with_parts(ledger.clone(), store);
        f.approve("S1").await;
        f.store.refuse_mirror_writes();
        f.orchestrator.issue(&SubmissionId::new("S1")).await.unwrap();
        f.store.heal();
        f.age_mirror("S1", 120);
    }

    let store: Arc<dyn IndexStore> = Arc::new(RocksIndexStore::open(&dir).unwrap());
    let f = Fixture::with_parts(ledger, store);
    assert_eq!(f.mirror("S1").status, MirrorStatus::LedgerConfirmedUnmirrored);

    let report = f.sweeper.sweep_once().await;
    assert_eq!(report.mirrored, 1);
    assert_eq!(f.mirror("S1").status, MirrorStatus::Mirrored);

    drop(f);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_stale_signal_wakes_running_sweeper() {
    let f = Arc::new(Fixture::new());
    f.approve("S1").await;
    let record = f
        .orchestrator
        .issue(&SubmissionId::new("S1"))
        .await
        .unwrap()
        .record()
        .clone();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = {
        let f = f.clone();
        tokio::spawn(async move { f.sweeper.run(shutdown_rx).await })
    };
    // Let the immediate first cycle pass.
    tokio::time::sleep(Duration::from_millis(100)).await;

    use skillcred_ledger::LedgerClient;
    f.ledger
        .inner
        .revoke(&record.id, &skillcred_core::IssuerId::new(skillcred_integration_tests::ISSUER))
        .await
        .unwrap();
    f.age_mirror("S1", 600);
    let result = f.resolver.resolve_credential(&record.id).await.unwrap();
    assert!(result.mirror_stale);

    let mut refreshed = false;
    for _ in 0..40 {
        if f.mirror("S1").active == Some(false) {
            refreshed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(refreshed, "sweeper should refresh the flagged mirror");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("sweeper stops")
        .unwrap();
}
