//! Fixture setup
//!
//! Both engines are reset and seeded regardless of which backend the factory
//! is bound to, so switching `BackendKind` never needs a separate setup step.

use steadfast_core::{DomainError, EntityId, Money, Result};
use tracing::info;

use crate::account::BankAccount;
use crate::adapters::relational::ACCOUNT_ID_COLUMN;
use crate::adapters::{DocumentAccountAdapter, RelationalAccountAdapter};
use crate::factory::TransactionFactory;

/// Id of the account used by the race scenarios
pub const TEST_ACCOUNT_ID: &str = "test_account_id";

/// Opening balance of the scenario account
pub const TEST_ACCOUNT_BALANCE: Money = Money::from_major(100_000);

/// Empty the account table and the account collection
pub fn reset_accounts(factory: &TransactionFactory) {
    let config = factory.config();
    factory
        .relational()
        .reset_table(&config.account_table, ACCOUNT_ID_COLUMN);
    factory.documents().drop_collection(&config.account_collection);
    factory.documents().create_collection(&config.account_collection);
}

/// Insert `account` into both engines
///
/// Accounts with a negative balance are rejected before anything is written.
pub fn insert_account(factory: &TransactionFactory, account: &BankAccount) -> Result<()> {
    if account.balance().is_negative() {
        return Err(DomainError::NegativeBalance(account.balance()).into());
    }
    let config = factory.config();
    factory
        .relational()
        .insert_row(&config.account_table, RelationalAccountAdapter::encode(account))?;
    factory
        .documents()
        .insert_one(&config.account_collection, DocumentAccountAdapter::encode(account))?;
    Ok(())
}

/// Reset both engines and insert [`TEST_ACCOUNT_ID`] with `balance` at version 1
pub fn seed_test_account(factory: &TransactionFactory, balance: Money) -> Result<BankAccount> {
    let account = BankAccount::try_open(TEST_ACCOUNT_ID, balance)?;
    reset_accounts(factory);
    insert_account(factory, &account)?;
    info!(account = TEST_ACCOUNT_ID, %balance, "test account seeded");
    Ok(account)
}

/// Latest committed state of `id` in the engine the factory is bound to
pub fn load_committed(factory: &TransactionFactory, id: &EntityId) -> Result<Option<BankAccount>> {
    let config = factory.config();
    if factory.backend().is_relational() {
        let adapter = RelationalAccountAdapter::new(config.account_table.clone());
        factory
            .relational()
            .fetch_committed(adapter.table(), id.as_str())?
            .map(|row| adapter.decode(id, &row))
            .transpose()
    } else {
        let adapter = DocumentAccountAdapter::new(config.account_collection.clone());
        factory
            .documents()
            .find_committed(adapter.collection(), id.as_str())
            .map(|doc| adapter.decode(id, &doc))
            .transpose()
    }
}
