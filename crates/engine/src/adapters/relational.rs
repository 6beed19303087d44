//! Relational account adapter
//!
//! Row layout: `account_id` (primary key), `balance` (numeric), `version` (int).
//!
//! The update is unconditional. Under repeatable read or serializable the
//! engine rejects the second of two conflicting writers; at read committed
//! the last writer silently wins.

use async_trait::async_trait;
use steadfast_concurrency::{Aggregate, BackendSession, PersistenceAdapter};
use steadfast_core::{EntityId, Error, Result, Version};
use steadfast_storage::{Datum, Row, RowFilter};
use tracing::debug;

use crate::account::BankAccount;

/// Primary key column
pub const ACCOUNT_ID_COLUMN: &str = "account_id";
/// Balance column
pub const BALANCE_COLUMN: &str = "balance";
/// Version column
pub const VERSION_COLUMN: &str = "version";

/// Reads and writes [`BankAccount`] rows in one table
#[derive(Debug, Clone)]
pub struct RelationalAccountAdapter {
    table: String,
}

impl RelationalAccountAdapter {
    /// Adapter over `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Row image of `account`
    pub fn encode(account: &BankAccount) -> Row {
        Row::new()
            .with(ACCOUNT_ID_COLUMN, account.id().as_str())
            .with(BALANCE_COLUMN, account.balance())
            .with(VERSION_COLUMN, version_to_int(account.version()))
    }

    pub(crate) fn decode(&self, id: &EntityId, row: &Row) -> Result<BankAccount> {
        let balance = row
            .get(BALANCE_COLUMN)
            .and_then(Datum::as_numeric)
            .ok_or_else(|| self.malformed(id, BALANCE_COLUMN))?;
        let version = row
            .get(VERSION_COLUMN)
            .and_then(Datum::as_int)
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| self.malformed(id, VERSION_COLUMN))?;
        BankAccount::try_restore(id.clone(), balance, Version::new(version))
            .map_err(|_| self.malformed(id, BALANCE_COLUMN))
    }

    fn malformed(&self, id: &EntityId, column: &str) -> Error {
        Error::Storage(format!(
            "row {} in {} has no valid {} column",
            id, self.table, column
        ))
    }
}

fn version_to_int(version: Version) -> i64 {
    i64::try_from(version.as_u64()).unwrap_or(i64::MAX)
}

#[async_trait]
impl PersistenceAdapter<BankAccount> for RelationalAccountAdapter {
    fn name(&self) -> &'static str {
        "relational"
    }

    async fn find(&self, session: &mut BackendSession, id: &EntityId) -> Result<Option<BankAccount>> {
        let txn = session.relational_mut()?;
        let row = txn.fetch_row(&self.table, id.as_str()).await?;
        debug!(table = %self.table, account = %id, found = row.is_some(), "fetched account row");
        row.map(|row| self.decode(id, &row)).transpose()
    }

    async fn update(
        &self,
        session: &mut BackendSession,
        account: &BankAccount,
        next_version: Version,
    ) -> Result<()> {
        let txn = session.relational_mut()?;
        let set = Row::new()
            .with(BALANCE_COLUMN, account.balance())
            .with(VERSION_COLUMN, version_to_int(next_version));
        let affected = txn
            .execute_update(&self.table, &RowFilter::key(account.id().as_str()), &set)
            .await?;
        debug!(
            table = %self.table,
            account = %account.id(),
            balance = %account.balance(),
            version = %next_version,
            affected,
            "updated account row"
        );
        if affected == 0 {
            return Err(Error::NotFound(account.id().clone()));
        }
        Ok(())
    }
}
