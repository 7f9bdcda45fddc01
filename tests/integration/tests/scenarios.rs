//! Integration test: the four end-to-end issuance/verification scenarios.

use skillcred_core::{IssuerId, MirrorStatus, SubmissionId};
use skillcred_credentials::{IssueError, IssueOutcome, Resolution, Source};
use skillcred_integration_tests::{Fixture, HOLDER, ISSUER};

fn credential(resolution: Resolution) -> skillcred_credentials::VerificationResult {
    match resolution {
        Resolution::Credential(result) => result,
        other => panic!("expected a credential resolution, got {:?}", other),
    }
}

// =========================================================================
// A: ledger and mirror both succeed
// =========================================================================

#[tokio::test]
async fn test_issue_and_verify_from_cache() {
    let f = Fixture::new();
    f.approve("S1").await;

    let outcome = f.orchestrator.issue(&SubmissionId::new("S1")).await.unwrap();
    let IssueOutcome::Issued {
        record,
        mirror_status,
        ..
    } = outcome
    else {
        panic!("expected a fresh issuance");
    };
    assert_eq!(mirror_status, MirrorStatus::Mirrored);
    assert_eq!(record.holder.as_str(), HOLDER);

    let result = credential(f.resolver.resolve(record.id.as_str()).await.unwrap());
    assert!(result.valid);
    assert_eq!(result.source, Source::Cache);
    assert!(!result.mirror_stale);
}

// =========================================================================
// B: ledger succeeds, local store down during the mirror write
// =========================================================================

#[tokio::test]
async fn test_mirror_failure_still_reports_success() {
    let f = Fixture::new();
    f.approve("S2").await;
    f.store.refuse_mirror_writes();

    let outcome = f.orchestrator.issue(&SubmissionId::new("S2")).await.unwrap();
    let IssueOutcome::Issued {
        record,
        mirror_status,
        ..
    } = outcome
    else {
        panic!("expected a fresh issuance");
    };
    assert_eq!(mirror_status, MirrorStatus::LedgerConfirmedUnmirrored);
    assert_eq!(record.skill, "distributed-systems");
    assert!(record.active);
    assert_eq!(f.mirror("S2").status, MirrorStatus::LedgerConfirmedUnmirrored);

    // Before the sweeper runs, verification goes to the ledger.
    let result = credential(f.resolver.resolve(record.id.as_str()).await.unwrap());
    assert!(result.valid);
    assert_eq!(result.source, Source::Ledger);

    f.store.heal();
    f.age_mirror("S2", 120);
    let report = f.sweeper.sweep_once().await;
    assert_eq!(report.mirrored, 1);

    let result = credential(f.resolver.resolve(record.id.as_str()).await.unwrap());
    assert_eq!(result.source, Source::Cache);
}

// =========================================================================
// C: ledger call times out
// =========================================================================

#[tokio::test]
async fn test_timeout_is_indeterminate_and_retry_checks_ledger_first() {
    let f = Fixture::new();
    f.approve("S3").await;
    f.ledger.set_lose_write_responses(true);

    let err = f.orchestrator.issue(&SubmissionId::new("S3")).await.unwrap_err();
    assert!(matches!(err, IssueError::IndeterminateLedgerResponse { .. }));
    assert_eq!(f.mirror("S3").status, MirrorStatus::PendingLedgerWrite);
    // The write landed even though we never heard back.
    assert_eq!(f.ledger.writes(), 1);

    f.ledger.set_lose_write_responses(false);
    let lookups_before = f.ledger.key_lookups();
    let outcome = f.orchestrator.issue(&SubmissionId::new("S3")).await.unwrap();

    assert!(matches!(outcome, IssueOutcome::Issued { .. }));
    assert_eq!(f.ledger.key_lookups(), lookups_before + 1);
    assert_eq!(f.ledger.issue_calls(), 1, "retry must not write again");
    assert_eq!(f.ledger.writes(), 1);
    assert_eq!(f.mirror("S3").status, MirrorStatus::Mirrored);
}

#[tokio::test]
async fn test_retry_writes_when_timed_out_call_never_landed() {
    let f = Fixture::new();
    f.approve("S3").await;
    f.ledger.set_write_delay(std::time::Duration::from_secs(2));

    let err = f.orchestrator.issue(&SubmissionId::new("S3")).await.unwrap_err();
    assert!(matches!(err, IssueError::IndeterminateLedgerResponse { .. }));
    assert_eq!(f.ledger.writes(), 0);

    f.ledger.set_write_delay(std::time::Duration::ZERO);
    let outcome = f.orchestrator.issue(&SubmissionId::new("S3")).await.unwrap();
    assert!(matches!(outcome, IssueOutcome::Issued { .. }));
    assert_eq!(f.ledger.issue_calls(), 2);
    assert_eq!(f.ledger.writes(), 1);
}

// =========================================================================
// D: revoked on the ledger, mirror still says valid
// =========================================================================

#[tokio::test]
async fn test_ledger_revocation_wins_over_mirror() {
    let f = Fixture::new();
    f.approve("S4").await;
    let record = f
        .orchestrator
        .issue(&SubmissionId::new("S4"))
        .await
        .unwrap()
        .record()
        .clone();

    use skillcred_ledger::LedgerClient;
    f.ledger
        .inner
        .revoke(&record.id, &IssuerId::new(ISSUER))
        .await
        .unwrap();
    f.age_mirror("S4", 600);
    assert_eq!(f.mirror("S4").active, Some(true));

    let result = credential(f.resolver.resolve(record.id.as_str()).await.unwrap());
    assert!(!result.valid);
    assert_eq!(result.source, Source::Ledger);
    assert!(result.mirror_stale);
    assert!(f.stale.is_flagged(&SubmissionId::new("S4")));

    let report = f.sweeper.sweep_once().await;
    assert_eq!(report.refreshed, 1);
    assert_eq!(f.mirror("S4").active, Some(false));

    let result = credential(f.resolver.resolve(record.id.as_str()).await.unwrap());
    assert!(!result.valid);
    assert_eq!(result.source, Source::Cache);
    assert!(!result.mirror_stale);
}
