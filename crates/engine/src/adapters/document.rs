//! Document account adapter
//!
//! Document layout:
//!
//! ```json
//! { "_id": "test_account_id", "balance": 10000000, "version": 1 }
//! ```
//!
//! `balance` is stored in minor units. The update filter carries the version
//! read at `find` time; if another transaction has already moved the version
//! on, nothing matches and the write is reported as a
//! [`Error::ConcurrencyConflict`].

use async_trait::async_trait;
use serde_json::{json, Value};
use steadfast_concurrency::{Aggregate, BackendSession, PersistenceAdapter};
use steadfast_core::{EntityId, Error, Money, Result, Version};
use steadfast_storage::document::ID_FIELD;
use steadfast_storage::{Document, StorageError};
use tracing::{debug, warn};

use crate::account::BankAccount;

/// Balance field, in minor units
pub const BALANCE_FIELD: &str = "balance";
/// Version field
pub const VERSION_FIELD: &str = "version";

/// Reads and writes [`BankAccount`] documents in one collection
#[derive(Debug, Clone)]
pub struct DocumentAccountAdapter {
    collection: String,
}

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

impl DocumentAccountAdapter {
    /// Adapter over `collection`
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }

    /// Collection name
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Document image of `account`
    pub fn encode(account: &BankAccount) -> Document {
        object(json!({
            ID_FIELD: account.id().as_str(),
            BALANCE_FIELD: account.balance().minor_units(),
            VERSION_FIELD: account.version().as_u64(),
        }))
    }

    pub(crate) fn decode(&self, id: &EntityId, doc: &Document) -> Result<BankAccount> {
        let balance = doc
            .get(BALANCE_FIELD)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.malformed(id, BALANCE_FIELD))?;
        let version = doc
            .get(VERSION_FIELD)
            .and_then(Value::as_u64)
            .ok_or_else(|| self.malformed(id, VERSION_FIELD))?;
        BankAccount::try_restore(id.clone(), Money::from_minor(balance), Version::new(version))
            .map_err(|_| self.malformed(id, BALANCE_FIELD))
    }

    fn malformed(&self, id: &EntityId, field: &str) -> Error {
        Error::Storage(format!(
            "document {} in {} has no valid {} field",
            id, self.collection, field
        ))
    }

    fn conflict(account: &BankAccount) -> Error {
        Error::ConcurrencyConflict {
            entity: account.id().clone(),
            expected_version: account.version(),
        }
    }
}

#[async_trait]
impl PersistenceAdapter<BankAccount> for DocumentAccountAdapter {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn find(&self, session: &mut BackendSession, id: &EntityId) -> Result<Option<BankAccount>> {
        let session = session.document_mut()?;
        let filter = object(json!({ ID_FIELD: id.as_str() }));
        let doc = session.find_one(&self.collection, &filter).await?;
        debug!(collection = %self.collection, account = %id, found = doc.is_some(), "fetched account document");
        doc.map(|doc| self.decode(id, &doc)).transpose()
    }

    async fn update(
        &self,
        session: &mut BackendSession,
        account: &BankAccount,
        next_version: Version,
    ) -> Result<()> {
        let session = session.document_mut()?;
        let filter = object(json!({
            ID_FIELD: account.id().as_str(),
            VERSION_FIELD: account.version().as_u64(),
        }));
        let set = object(json!({
            BALANCE_FIELD: account.balance().minor_units(),
            VERSION_FIELD: next_version.as_u64(),
        }));

        let result = match session.update_one(&self.collection, &filter, &set).await {
            Ok(result) => result,
            Err(StorageError::WriteConflict { .. }) => {
                warn!(collection = %self.collection, account = %account.id(), "document held by another transaction");
                return Err(Self::conflict(account));
            }
            Err(e) => return Err(e.into()),
        };

        if result.modified_count != 1 {
            warn!(
                collection = %self.collection,
                account = %account.id(),
                expected = %account.version(),
                "version check matched nothing"
            );
            return Err(Self::conflict(account));
        }
        debug!(
            collection = %self.collection,
            account = %account.id(),
            balance = %account.balance(),
            version = %next_version,
            "updated account document"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steadfast_storage::DocumentStore;

    const COLLECTION: &str = "bank_account";

    fn store_with(account: &BankAccount) -> DocumentStore {
        let store = DocumentStore::new();
        store.create_collection(COLLECTION);
        store
            .insert_one(COLLECTION, DocumentAccountAdapter::encode(account))
            .unwrap();
        store
    }

    async fn session(store: &DocumentStore) -> BackendSession {
        let mut session = store.start_session().await;
        session.start_transaction().unwrap();
        session.into()
    }

    #[tokio::test]
    async fn test_find_and_update_round_trip() {
        let store = store_with(&BankAccount::open("a", Money::from_major(50)));
        let adapter = DocumentAccountAdapter::new(COLLECTION);
        let mut s = session(&store).await;

        let mut account = adapter.find(&mut s, &EntityId::new("a")).await.unwrap().unwrap();
        assert_eq!(account, BankAccount::open("a", Money::from_major(50)));

        account.deposit(Money::from_minor(1)).unwrap();
        adapter.update(&mut s, &account, Version::new(2)).await.unwrap();
        s.commit().await.unwrap();

        let doc = store.find_committed(COLLECTION, "a").unwrap();
        assert_eq!(doc.get(BALANCE_FIELD), Some(&json!(5001)));
        assert_eq!(doc.get(VERSION_FIELD), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_stale_version_is_conflict() {
        let store = store_with(&BankAccount::open("a", Money::from_major(50)));
        let adapter = DocumentAccountAdapter::new(COLLECTION);

        let mut first = session(&store).await;
        let mut second = session(&store).await;
        let mine = adapter.find(&mut first, &EntityId::new("a")).await.unwrap().unwrap();
        let theirs = adapter.find(&mut second, &EntityId::new("a")).await.unwrap().unwrap();

        adapter.update(&mut second, &theirs, Version::new(2)).await.unwrap();
        second.commit().await.unwrap();

        let err = adapter.update(&mut first, &mine, Version::new(2)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ConcurrencyConflict { ref entity, expected_version } if entity.as_str() == "a" && expected_version == Version::INITIAL
        ));
        assert!(err.to_string().contains("concurrent update"));
    }

    #[tokio::test]
    async fn test_pending_write_is_conflict() {
        let store = store_with(&BankAccount::open("a", Money::from_major(50)));
        let adapter = DocumentAccountAdapter::new(COLLECTION);

        let mut first = session(&store).await;
        let mut second = session(&store).await;
        let account = adapter.find(&mut first, &EntityId::new("a")).await.unwrap().unwrap();

        adapter.update(&mut first, &account, Version::new(2)).await.unwrap();
        let err = adapter.update(&mut second, &account, Version::new(2)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_negative_stored_balance_is_malformed() {
        let store = store_with(&BankAccount::open("a", Money::from_minor(-3)));
        let adapter = DocumentAccountAdapter::new(COLLECTION);
        let mut s = session(&store).await;
        let err = adapter.find(&mut s, &EntityId::new("a")).await.unwrap_err();
        assert!(matches!(err, Error::Storage(ref m) if m.contains("balance")));
    }

    #[tokio::test]
    async fn test_find_missing_is_none() {
        let store = store_with(&BankAccount::open("a", Money::ZERO));
        let adapter = DocumentAccountAdapter::new(COLLECTION);
        let mut s = session(&store).await;
        assert!(adapter.find(&mut s, &EntityId::new("b")).await.unwrap().is_none());
    }
}
