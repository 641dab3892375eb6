mod fixtures;

use futures::future::join_all;
use fixtures::{at, TestLedger};
use volunteer_ledger::models::{AuditStatus, WorkHourOperation};
use volunteer_ledger::{ErrorKind, LedgerError, VoidRequest};

async fn checked_in() -> (TestLedger, fixtures::Seeded, i64) {
    let (harness, seeded) = TestLedger::with_activity(4.0, 10).await;
    let signup_id = harness.seed_signup(seeded.activity_id, seeded.volunteer_id).await;
    harness.clock.set(at(9, 0));
    harness
        .signups()
        .check_in(&harness.volunteer_actor(), seeded.activity_id)
        .await
        .unwrap();
    harness.clock.set(at(12, 0));
    (harness, seeded, signup_id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_grant_once() {
    let (harness, seeded, signup_id) = checked_in().await;

    let tasks = (0..6).map(|_| {
        let signups = harness.signups();
        let actor = harness.volunteer_actor();
        let activity_id = seeded.activity_id;
        tokio::spawn(async move { signups.check_out(&actor, activity_id).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let first = results[0].as_ref().expect("check-out succeeded");
    for result in &results {
        assert_eq!(result.as_ref().unwrap(), first);
    }
    assert_eq!(first.granted_hours, 3.0);

    let logs = harness.logs(signup_id).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].operation_type, WorkHourOperation::Grant);
    let volunteer = harness.volunteer(seeded.volunteer_id).await;
    assert_eq!(volunteer.total_hours, 3.0);
    assert_eq!(volunteer.service_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_voids_with_different_keys_apply_once() {
    let (harness, seeded, signup_id) = checked_in().await;
    harness
        .signups()
        .check_out(&harness.volunteer_actor(), seeded.activity_id)
        .await
        .unwrap();

    let tasks = ["void-a", "void-b"].into_iter().map(|key| {
        let ledger = harness.ledger();
        let actor = harness.org_actor();
        let request = VoidRequest {
            signup_id,
            reason: "duplicate attendance".to_string(),
            idempotency_key: key.to_string(),
        };
        tokio::spawn(async move { ledger.void(&actor, request).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let applied = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(applied, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err.kind(), ErrorKind::StateConflict | ErrorKind::LinkIntegrity),
            "unexpected error: {err}"
        );
    }

    let voids: Vec<_> = harness
        .logs(signup_id)
        .await
        .into_iter()
        .filter(|log| log.operation_type == WorkHourOperation::Void)
        .collect();
    assert_eq!(voids.len(), 1);
    harness.assert_aggregate_matches_ledger(seeded.volunteer_id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retries_with_same_key_share_one_entry() {
    let (harness, seeded, signup_id) = checked_in().await;
    harness
        .signups()
        .check_out(&harness.volunteer_actor(), seeded.activity_id)
        .await
        .unwrap();

    let tasks = (0..4).map(|_| {
        let ledger = harness.ledger();
        let actor = harness.org_actor();
        let request = VoidRequest {
            signup_id,
            reason: "duplicate attendance".to_string(),
            idempotency_key: "void-retry".to_string(),
        };
        tokio::spawn(async move { ledger.void(&actor, request).await })
    });
    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("void succeeded"))
        .collect();

    let log_id = outcomes[0].log_id;
    assert!(outcomes.iter().all(|o| o.log_id == log_id));
    assert_eq!(outcomes.iter().filter(|o| !o.replayed).count(), 1);
    assert_eq!(harness.logs(signup_id).await.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_signups_create_one_proposal() {
    let (harness, seeded) = TestLedger::with_activity(4.0, 10).await;

    let tasks = (0..5).map(|_| {
        let signups = harness.signups();
        let actor = harness.volunteer_actor();
        let activity_id = seeded.activity_id;
        tokio::spawn(async move { signups.signup(&actor, activity_id).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, LedgerError::DuplicateSignup { .. }), "unexpected error: {err}");
    }
    assert_eq!(harness.audit_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_resolve_once() {
    let (harness, seeded) = TestLedger::with_activity(4.0, 10).await;
    let record_id = harness
        .memberships()
        .request_join(&harness.volunteer_actor(), seeded.org_id)
        .await
        .unwrap();

    let tasks = (0..4).map(|_| {
        let audits = harness.audits();
        let actor = harness.org_actor();
        tokio::spawn(async move { audits.approve(&actor, record_id, None).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, LedgerError::AlreadyProcessed { .. }), "unexpected error: {err}");
    }
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM org_members")
        .fetch_one(&harness.pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identity_submissions_create_one_record() {
    let (harness, _seeded) = TestLedger::with_activity(4.0, 10).await;

    let tasks = (0..8).map(|_| {
        let audits = harness.audits();
        let actor = harness.volunteer_actor();
        tokio::spawn(async move { audits.submit_identity_verification(&actor, "Lin Mei").await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::StateConflict, "unexpected error: {err}");
    }
    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_records WHERE target_type = 'identity' AND status = 'pending'",
    )
    .fetch_one(&harness.pool)
    .await
    .unwrap();
    assert_eq!(pending, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_organization_submissions_create_one_record() {
    let (harness, _seeded) = TestLedger::with_activity(4.0, 10).await;

    let tasks = (0..8).map(|_| {
        let audits = harness.audits();
        let actor = harness.org_actor();
        tokio::spawn(async move { audits.submit_organization_verification(&actor).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(harness.audit_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rejections_resolve_once() {
    let (harness, seeded) = TestLedger::with_activity(4.0, 10).await;
    let record_id = harness
        .memberships()
        .request_join(&harness.volunteer_actor(), seeded.org_id)
        .await
        .unwrap();

    let tasks = (0..4).map(|n| {
        let audits = harness.audits();
        let actor = harness.org_actor();
        tokio::spawn(async move { audits.reject(&actor, record_id, &format!("reviewer {n}")).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, LedgerError::AlreadyProcessed { .. }), "unexpected error: {err}");
    }
    assert_eq!(harness.record(record_id).await.status, AuditStatus::Rejected);
}
