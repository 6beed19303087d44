//! Optimistic backend: the version check rejects the stale writer.

use crate::common::*;

#[tokio::test(start_paused = true)]
async fn second_withdrawal_gets_concurrency_conflict() {
    let db = Steadfast::in_memory(BackendKind::Optimistic).unwrap();
    let report = run_withdrawal_race(&db, TEST_ACCOUNT_BALANCE, TEST_ACCOUNT_BALANCE, &scenario_delays())
        .await
        .unwrap();

    assert_eq!(report.successes(), 1);
    assert!(report.outcomes[0].succeeded());
    let err = report.outcomes[1].result.as_ref().unwrap_err();
    match err {
        Error::ConcurrencyConflict {
            entity,
            expected_version,
        } => {
            assert_eq!(entity, &account_id());
            assert_eq!(*expected_version, Version::INITIAL);
        }
        other => panic!("expected a concurrency conflict, got {}", other),
    }
    assert!(err.to_string().contains("concurrent update"));

    assert_eq!(report.final_account.balance(), Money::ZERO);
    assert_eq!(report.final_account.version(), Version::new(2));
    assert!(!report.lost_update());
}

#[tokio::test(start_paused = true)]
async fn partial_withdrawals_still_conflict() {
    // Both withdrawals fit in the balance, but the second one read v1
    let db = Steadfast::in_memory(BackendKind::Optimistic).unwrap();
    let report = run_withdrawal_race(
        &db,
        Money::from_major(100),
        Money::from_major(30),
        &scenario_delays(),
    )
    .await
    .unwrap();

    assert_eq!(report.successes(), 1);
    assert!(report.failures().all(Error::is_conflict));
    assert_eq!(report.final_account.balance(), Money::from_major(70));
    assert_eq!(report.final_account.version(), Version::new(2));
}

#[tokio::test(start_paused = true)]
async fn retry_after_conflict_succeeds() {
    let db = seeded(BackendKind::Optimistic, Money::from_major(100));
    let id = account_id();

    let slow = db.withdraw(&id, Money::from_major(30), Duration::from_secs(2));
    let fast = db.withdraw(&id, Money::from_major(30), Duration::from_secs(1));
    let (slow, fast) = tokio::join!(slow, fast);
    assert_eq!(fast.unwrap(), Money::from_major(70));
    assert!(slow.unwrap_err().is_retryable());

    // Re-running the whole cycle reads fresh state
    let balance = db.withdraw(&id, Money::from_major(30), Duration::ZERO).await.unwrap();
    assert_eq!(balance, Money::from_major(40));
    assert_eq!(committed(&db).version(), Version::new(3));
}

#[tokio::test(start_paused = true)]
async fn spawned_withdrawals() {
    let db = seeded(BackendKind::Optimistic, TEST_ACCOUNT_BALANCE);
    let handles: Vec<_> = scenario_delays()
        .into_iter()
        .map(|delay| {
            let db = db.clone();
            tokio::spawn(async move { db.withdraw(&account_id(), TEST_ACCOUNT_BALANCE, delay).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(committed(&db).balance(), Money::ZERO);
}
