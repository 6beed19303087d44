//! Version advancement and persistence round trips.

use crate::common::*;

// ============================================================================
// Round trip
// ============================================================================

#[tokio::test]
async fn persist_then_find_preserves_state() {
    for backend in BackendKind::ALL {
        let db = seeded(backend, Money::from_major(10));
        let accounts = db.accounts();
        let id = EntityId::new("round-trip");
        db.insert_account(&BankAccount::restore(id.clone(), Money::from_minor(1234), Version::new(7)))
            .unwrap();

        let mut uow = db.begin().await.unwrap();
        let handle = accounts.repository(&mut uow).find(&id).await.unwrap().unwrap();
        handle.update(|a| a.deposit(Money::from_minor(1))).unwrap();
        uow.commit().await.unwrap();

        let mut uow = db.begin().await.unwrap();
        let reloaded = accounts.repository(&mut uow).find(&id).await.unwrap().unwrap();
        assert_eq!(
            reloaded.snapshot(),
            BankAccount::restore(id.clone(), Money::from_minor(1235), Version::new(8)),
            "backend {}",
            backend
        );
        uow.rollback().await.unwrap();
    }
}

// ============================================================================
// Version advancement
// ============================================================================

#[tokio::test]
async fn commit_advances_every_tracked_version_by_one() {
    for backend in BackendKind::ALL {
        let db = seeded(backend, Money::from_major(100));
        let accounts = db.accounts();
        let other = EntityId::new("savings");
        db.insert_account(&BankAccount::restore(other.clone(), Money::ZERO, Version::new(4)))
            .unwrap();

        let mut uow = db.begin().await.unwrap();
        let (checking, savings) = {
            let mut repo = accounts.repository(&mut uow);
            (
                repo.find(&account_id()).await.unwrap().unwrap(),
                repo.find(&other).await.unwrap().unwrap(),
            )
        };
        checking.update(|a| a.withdraw(Money::from_major(25))).unwrap();
        savings.update(|a| a.deposit(Money::from_major(25))).unwrap();
        assert_eq!(uow.tracked_len(), 2);
        uow.commit().await.unwrap();

        assert_eq!(checking.version(), Version::new(2));
        assert_eq!(savings.version(), Version::new(5));
        assert_eq!(committed(&db).version(), Version::new(2));
        let stored = db.account(&other).unwrap().unwrap();
        assert_eq!(stored.version(), Version::new(5));
        assert_eq!(stored.balance(), Money::from_major(25));
    }
}

#[tokio::test]
async fn unchanged_aggregate_still_gets_new_version() {
    let db = seeded(BackendKind::Optimistic, Money::from_major(1));
    let accounts = db.accounts();
    let mut uow = db.begin().await.unwrap();
    let handle = accounts.repository(&mut uow).find(&account_id()).await.unwrap().unwrap();
    uow.commit().await.unwrap();

    assert_eq!(handle.version(), Version::new(2));
    assert_eq!(committed(&db).version(), Version::new(2));
    assert_eq!(committed(&db).balance(), Money::from_major(1));
}

#[tokio::test]
async fn rollback_keeps_version() {
    let db = seeded(BackendKind::Pessimistic, Money::from_major(1));
    let accounts = db.accounts();
    let mut uow = db.begin().await.unwrap();
    let handle = accounts.repository(&mut uow).find(&account_id()).await.unwrap().unwrap();
    handle.update(|a| a.withdraw(Money::from_major(1))).unwrap();
    uow.rollback().await.unwrap();

    assert_eq!(handle.version(), Version::INITIAL);
    assert_eq!(uow.tracked_len(), 0);
    assert_eq!(committed(&db), BankAccount::open(TEST_ACCOUNT_ID, Money::from_major(1)));
}

// ============================================================================
// Two transactions at the same version
// ============================================================================

#[tokio::test]
async fn racing_units_of_work_exactly_one_commits() {
    for backend in GUARDED {
        let db = seeded(backend, Money::from_major(100));
        let accounts = db.accounts();

        let mut first = db.begin().await.unwrap();
        let mut second = db.begin().await.unwrap();
        let a = accounts.repository(&mut first).find(&account_id()).await.unwrap().unwrap();
        let b = accounts.repository(&mut second).find(&account_id()).await.unwrap().unwrap();
        assert_eq!(a.version(), b.version());

        a.update(|acct| acct.withdraw(Money::from_major(80))).unwrap();
        b.update(|acct| acct.withdraw(Money::from_major(80))).unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_conflict(), "backend {}: {}", backend, err);
        second.rollback().await.unwrap();

        let account = committed(&db);
        assert_eq!(account.version(), Version::new(2));
        assert_eq!(account.balance(), Money::from_major(20));
        assert_eq!(b.version(), Version::INITIAL);
    }
}

#[tokio::test]
async fn unguarded_units_of_work_both_commit() {
    let db = seeded(BackendKind::Unguarded, Money::from_major(100));
    let accounts = db.accounts();

    let mut first = db.begin().await.unwrap();
    let mut second = db.begin().await.unwrap();
    let a = accounts.repository(&mut first).find(&account_id()).await.unwrap().unwrap();
    let b = accounts.repository(&mut second).find(&account_id()).await.unwrap().unwrap();
    a.update(|acct| acct.withdraw(Money::from_major(80))).unwrap();
    b.update(|acct| acct.withdraw(Money::from_major(80))).unwrap();

    first.commit().await.unwrap();
    second.commit().await.unwrap();
    // 160 withdrawn from an account holding 100
    assert_eq!(committed(&db).balance(), Money::from_major(20));
}
