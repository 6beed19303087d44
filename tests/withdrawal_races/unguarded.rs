//! Unguarded backend: read committed with unconditional writes.
//!
//! Both withdrawals commit and the account is debited twice. This is the
//! anomaly the guarded backends exist to prevent.

use crate::common::*;

#[tokio::test(start_paused = true)]
async fn both_withdrawals_commit_and_one_update_is_lost() {
    let db = Steadfast::in_memory(BackendKind::Unguarded).unwrap();
    let report = run_withdrawal_race(&db, TEST_ACCOUNT_BALANCE, TEST_ACCOUNT_BALANCE, &scenario_delays())
        .await
        .unwrap();

    assert_eq!(report.successes(), 2);
    for outcome in &report.outcomes {
        assert_eq!(outcome.result.as_ref().unwrap(), &Money::ZERO);
    }
    assert_eq!(report.final_account.balance(), Money::ZERO);
    assert_eq!(report.total_debited(), Money::from_major(200_000));
    assert!(report.lost_update());
}

#[tokio::test(start_paused = true)]
async fn partial_withdrawals_overwrite_each_other() {
    let db = Steadfast::in_memory(BackendKind::Unguarded).unwrap();
    let report = run_withdrawal_race(
        &db,
        Money::from_major(100),
        Money::from_major(30),
        &scenario_delays(),
    )
    .await
    .unwrap();

    assert_eq!(report.successes(), 2);
    // Two debits of 30 leave 70, not 40
    assert_eq!(report.final_account.balance(), Money::from_major(70));
    // Both wrote version 2
    assert_eq!(report.final_account.version(), Version::new(2));
    assert!(report.lost_update());
}

#[tokio::test(start_paused = true)]
async fn double_debit_near_the_money_limit_saturates() {
    let db = Steadfast::in_memory(BackendKind::Unguarded).unwrap();
    let huge = Money::from_minor(5_000_000_000_000_000_000);
    let delays = [Duration::from_millis(1), Duration::from_millis(2)];
    let report = run_withdrawal_race(&db, huge, huge, &delays).await.unwrap();

    assert_eq!(report.successes(), 2);
    assert_eq!(report.final_account.balance(), Money::ZERO);
    assert_eq!(report.total_debited(), Money::from_minor(i64::MAX));
    assert_eq!(report.balance_drop(), huge);
    assert!(report.lost_update());
}
