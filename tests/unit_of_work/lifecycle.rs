//! Unit-of-work lifecycle through the factory.

use crate::common::*;

#[tokio::test]
async fn failing_callback_never_commits() {
    for backend in BackendKind::ALL {
        let db = seeded(backend, Money::from_major(100));
        let accounts = db.accounts();

        let err = db
            .run(move |uow| {
                Box::pin(async move {
                    let account = accounts.repository(uow).find(&account_id()).await?.unwrap();
                    account.update(|a| a.withdraw(Money::from_major(50)))?;
                    Err::<(), _>(Error::Internal("callback gave up".into()))
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Internal(ref m) if m == "callback gave up"));
        assert_eq!(committed(&db), BankAccount::open(TEST_ACCOUNT_ID, Money::from_major(100)));
        assert_eq!(db.metrics().transactions_aborted, 1);
        assert_eq!(db.metrics().transactions_committed, 0);
    }
}

#[tokio::test]
async fn domain_violation_rolls_back_earlier_mutations() {
    let db = seeded(BackendKind::Optimistic, Money::from_major(100));
    let other = EntityId::new("other");
    db.insert_account(&BankAccount::open(other.clone(), Money::from_major(5)))
        .unwrap();
    let accounts = db.accounts();

    let target = other.clone();
    let err = db
        .run(move |uow| {
            Box::pin(async move {
                let mut repo = accounts.repository(uow);
                let from = repo.find(&account_id()).await?.unwrap();
                let to = repo.find(&target).await?.unwrap();
                to.update(|a| a.deposit(Money::from_major(500)))?;
                from.update(|a| a.withdraw(Money::from_major(500)))?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::DomainRuleViolation(DomainError::InsufficientFunds { .. })
    ));
    assert_eq!(db.account(&other).unwrap().unwrap().balance(), Money::from_major(5));
    assert_eq!(committed(&db).balance(), Money::from_major(100));
}

#[tokio::test]
async fn missing_account_is_none_not_error() {
    let db = seeded(BackendKind::Pessimistic, Money::ZERO);
    let accounts = db.accounts();
    let mut uow = db.begin().await.unwrap();
    let found = accounts
        .repository(&mut uow)
        .find(&EntityId::new("ghost"))
        .await
        .unwrap();
    assert!(found.is_none());
    assert_eq!(uow.tracked_len(), 0);
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn closed_unit_of_work_rejects_work() {
    let db = seeded(BackendKind::Optimistic, Money::ZERO);
    let accounts = db.accounts();
    let mut uow = db.begin().await.unwrap();
    uow.commit().await.unwrap();

    let err = accounts.repository(&mut uow).find(&account_id()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { expected: "open", actual: "closed" }));
    // Rollback after commit is a no-op
    uow.rollback().await.unwrap();
    assert_eq!(db.metrics().transactions_aborted, 0);
}

#[tokio::test]
async fn connection_limit_is_enforced() {
    let db = Steadfast::builder().max_connections(1).open().unwrap();
    db.seed_test_account(Money::ZERO).unwrap();

    let mut held = db.begin().await.unwrap();
    let waiting = tokio::time::timeout(Duration::from_millis(50), db.begin()).await;
    assert!(waiting.is_err(), "second unit of work should wait for a permit");

    held.rollback().await.unwrap();
    let mut next = db.begin().await.unwrap();
    next.rollback().await.unwrap();
}

#[tokio::test]
async fn metrics_track_outcomes() {
    let db = seeded(BackendKind::Pessimistic, Money::from_major(10));
    let id = account_id();
    db.withdraw(&id, Money::from_major(1), Duration::ZERO).await.unwrap();
    db.withdraw(&id, Money::from_major(100), Duration::ZERO)
        .await
        .unwrap_err();

    let metrics = db.metrics();
    assert_eq!(metrics.transactions_committed, 1);
    assert_eq!(metrics.transactions_aborted, 1);
    assert_eq!(metrics.transactions_conflicted, 0);
    assert!((metrics.commit_rate - 0.5).abs() < f64::EPSILON);
}
