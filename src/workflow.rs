//! Account workflows and the withdrawal race.
//!
//! The race runs two (or more) withdrawals of the full balance against the
//! same account concurrently. Each withdrawal reads the account, waits for
//! its delay, then debits and commits:
//!
//! ```text
//!  t=0   A: begin, read v1 (100000)      B: begin, read v1 (100000)
//!  t=1s  A: withdraw, commit → v2 (0)
//!  t=2s                                  B: withdraw, commit → ?
//! ```
//!
//! What happens to B depends on the backend:
//!
//! | Backend | B's commit | Final balance | Debited |
//! |---------|------------|---------------|---------|
//! | `Pessimistic` | serialization failure | 0 | 100000 |
//! | `Optimistic` | concurrency conflict | 0 | 100000 |
//! | `Unguarded` | succeeds | 0 | 200000 (lost update) |

use std::time::Duration;

use futures::future::join_all;
use steadfast_concurrency::UnitOfWork;
use steadfast_core::{BackendKind, DomainError, EntityId, Error, Money, Result};
use steadfast_engine::{AccountRepositories, BankAccount};
use tracing::{info, warn};

use crate::database::Steadfast;

/// Withdraw `amount` from `id` inside `uow`. Returns the new balance.
///
/// A missing account is reported as [`Error::NotFound`].
pub async fn withdraw(
    uow: &mut UnitOfWork,
    accounts: &AccountRepositories,
    id: &EntityId,
    amount: Money,
    delay: Duration,
) -> Result<Money> {
    info!(account = %id, %amount, backend = %uow.backend(), "performing withdrawal");
    let account = accounts
        .repository(uow)
        .find(id)
        .await?
        .ok_or_else(|| Error::NotFound(id.clone()))?;

    // Checked again by the mutator after the delay.
    let available = account.with(BankAccount::balance);
    if amount > available {
        return Err(DomainError::InsufficientFunds {
            requested: amount,
            available,
        }
        .into());
    }

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    account.update(|a| a.withdraw(amount))?;
    Ok(account.with(BankAccount::balance))
}

/// Deposit `amount` into `id` inside `uow`. Returns the new balance.
pub async fn deposit(
    uow: &mut UnitOfWork,
    accounts: &AccountRepositories,
    id: &EntityId,
    amount: Money,
) -> Result<Money> {
    info!(account = %id, %amount, backend = %uow.backend(), "performing deposit");
    let account = accounts
        .repository(uow)
        .find(id)
        .await?
        .ok_or_else(|| Error::NotFound(id.clone()))?;
    account.update(|a| a.deposit(amount))?;
    Ok(account.with(BankAccount::balance))
}

/// One participant of a race
#[derive(Debug)]
pub struct WithdrawalOutcome {
    /// Delay between read and write
    pub delay: Duration,
    /// New balance on success
    pub result: Result<Money>,
}

impl WithdrawalOutcome {
    /// True if the withdrawal committed
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Result of [`run_withdrawal_race`]
#[derive(Debug)]
pub struct RaceReport {
    /// Backend the race ran on
    pub backend: BackendKind,
    /// Amount each participant tried to withdraw
    pub amount: Money,
    /// Account state before the race
    pub initial: BankAccount,
    /// Outcomes, in participant order
    pub outcomes: Vec<WithdrawalOutcome>,
    /// Committed account state after the race
    pub final_account: BankAccount,
}

impl RaceReport {
    /// Number of withdrawals that committed
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// Errors of the withdrawals that failed
    pub fn failures(&self) -> impl Iterator<Item = &Error> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    /// Sum the successful participants believe they withdrew, saturating at
    /// the largest representable amount
    pub fn total_debited(&self) -> Money {
        saturate(self.debited_minor())
    }

    /// How much the committed balance actually went down
    pub fn balance_drop(&self) -> Money {
        saturate(self.drop_minor())
    }

    /// True if committed withdrawals exceed what left the account
    pub fn lost_update(&self) -> bool {
        self.debited_minor() > self.drop_minor()
    }

    fn debited_minor(&self) -> i128 {
        i128::from(self.amount.minor_units()) * self.successes() as i128
    }

    fn drop_minor(&self) -> i128 {
        i128::from(self.initial.balance().minor_units())
            - i128::from(self.final_account.balance().minor_units())
    }
}

fn saturate(minor: i128) -> Money {
    let clamped = minor.clamp(i128::from(i64::MIN), i128::from(i64::MAX));
    Money::from_minor(i64::try_from(clamped).unwrap_or(i64::MAX))
}

/// Seed [`TEST_ACCOUNT_ID`](steadfast_engine::TEST_ACCOUNT_ID) with `balance` and race one withdrawal of
/// `amount` per entry of `delays`.
pub async fn run_withdrawal_race(
    db: &Steadfast,
    balance: Money,
    amount: Money,
    delays: &[Duration],
) -> Result<RaceReport> {
    let initial = db.seed_test_account(balance)?;
    let id = initial.id().clone();
    info!(backend = %db.backend(), %balance, %amount, participants = delays.len(), "starting withdrawal race");

    let results = join_all(delays.iter().map(|&delay| db.withdraw(&id, amount, delay))).await;

    let outcomes: Vec<WithdrawalOutcome> = delays
        .iter()
        .zip(results)
        .map(|(&delay, result)| {
            match &result {
                Ok(balance) => info!(delay_ms = delay.as_millis() as u64, %balance, "withdrawal committed"),
                Err(e) => warn!(delay_ms = delay.as_millis() as u64, error = %e, "withdrawal failed"),
            }
            WithdrawalOutcome { delay, result }
        })
        .collect();

    let final_account = db
        .account(&id)?
        .ok_or_else(|| Error::NotFound(id.clone()))?;

    let report = RaceReport {
        backend: db.backend(),
        amount,
        initial,
        outcomes,
        final_account,
    };
    info!(
        backend = %report.backend,
        successes = report.successes(),
        final_balance = %report.final_account.balance(),
        lost_update = report.lost_update(),
        "withdrawal race finished"
    );
    Ok(report)
}
