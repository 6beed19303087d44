//! Pessimistic backend: the relational engine aborts the late writer.

use crate::common::*;
use steadfast_storage::{Row, RowFilter};

// ============================================================================
// Reference scenario
// ============================================================================

#[tokio::test(start_paused = true)]
async fn second_withdrawal_gets_serialization_failure() {
    let db = Steadfast::in_memory(BackendKind::Pessimistic).unwrap();
    let report = workflow_race(&db).await;

    assert_eq!(report.successes(), 1);
    assert!(report.outcomes[0].succeeded());
    let err = report.outcomes[1].result.as_ref().unwrap_err();
    assert!(
        matches!(err, Error::SerializationFailure(msg) if msg.contains("could not serialize access due to concurrent update")),
        "unexpected error: {}",
        err
    );
    assert!(err.is_retryable());

    assert_eq!(report.final_account.balance(), Money::ZERO);
    assert_eq!(report.final_account.version(), Version::new(2));
    assert!(!report.lost_update());
}

#[tokio::test(start_paused = true)]
async fn serializable_isolation_behaves_the_same() {
    let db = Steadfast::builder()
        .backend(BackendKind::Pessimistic)
        .pessimistic_isolation(IsolationLevel::Serializable)
        .open()
        .unwrap();
    let report = workflow_race(&db).await;

    assert_eq!(report.successes(), 1);
    assert!(matches!(
        report.failures().next(),
        Some(Error::SerializationFailure(_))
    ));
    assert_eq!(report.final_account.balance(), Money::ZERO);
}

#[tokio::test(start_paused = true)]
async fn failed_participant_is_rolled_back() {
    let db = Steadfast::in_memory(BackendKind::Pessimistic).unwrap();
    workflow_race(&db).await;

    let metrics = db.metrics();
    assert_eq!(metrics.transactions_committed, 1);
    assert_eq!(metrics.transactions_aborted, 1);
    assert_eq!(metrics.transactions_conflicted, 1);
    assert_eq!(metrics.transactions_active, 0);
    assert_eq!(db.factory().available_connections(), db.config().max_connections);
}

// ============================================================================
// Writer blocked on an uncommitted row
// ============================================================================

#[tokio::test(start_paused = true)]
async fn writer_waiting_on_row_lock_fails_after_holder_commits() {
    let db = seeded(BackendKind::Pessimistic, Money::from_major(100));
    let id = account_id();
    let accounts = db.accounts();

    let mut first = db.begin().await.unwrap();
    let mut second = db.begin().await.unwrap();

    let a = accounts.repository(&mut first).find(&id).await.unwrap().unwrap();
    let b = accounts.repository(&mut second).find(&id).await.unwrap().unwrap();
    a.update(|acct| acct.withdraw(Money::from_major(60))).unwrap();
    b.update(|acct| acct.withdraw(Money::from_major(60))).unwrap();

    // Take the row lock in `first` without committing
    let table = db.config().account_table.clone();
    first
        .session_mut()
        .unwrap()
        .relational_mut()
        .unwrap()
        .execute_update(&table, &RowFilter::key(id.as_str()), &Row::new().with("balance", Money::from_major(40)))
        .await
        .unwrap();

    let holder = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        first.commit().await
    };
    let (second_result, first_result) = tokio::join!(second.commit(), holder);

    first_result.unwrap();
    assert!(matches!(second_result, Err(Error::SerializationFailure(_))));
    assert_eq!(second.state(), UowState::Failed);
    second.rollback().await.unwrap();

    let account = committed(&db);
    assert_eq!(account.balance(), Money::from_major(40));
    assert_eq!(account.version(), Version::new(2));
}

async fn workflow_race(db: &Steadfast) -> RaceReport {
    run_withdrawal_race(db, TEST_ACCOUNT_BALANCE, TEST_ACCOUNT_BALANCE, &scenario_delays())
        .await
        .unwrap()
}
