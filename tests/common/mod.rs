//! Shared helpers for the integration suites.

#![allow(dead_code)]

pub use steadfast::prelude::*;

/// Delays used by the reference scenario
pub fn scenario_delays() -> Vec<Duration> {
    vec![Duration::from_secs(1), Duration::from_secs(2)]
}

/// The seeded scenario account id
pub fn account_id() -> EntityId {
    EntityId::new(TEST_ACCOUNT_ID)
}

/// Instance for `backend` with the scenario account seeded at `balance`
pub fn seeded(backend: BackendKind, balance: Money) -> Steadfast {
    let db = Steadfast::in_memory(backend).expect("open in-memory instance");
    db.seed_test_account(balance).expect("seed test account");
    db
}

/// Committed state of the scenario account
pub fn committed(db: &Steadfast) -> BankAccount {
    db.account(&account_id())
        .expect("load account")
        .expect("account exists")
}

/// Backends that prevent lost updates
pub const GUARDED: [BackendKind; 2] = [BackendKind::Pessimistic, BackendKind::Optimistic];
