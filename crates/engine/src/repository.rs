//! Repositories
//!
//! A [`Repository`] borrows a unit of work for as long as it is used. Every
//! aggregate it returns is already tracked by that unit of work, so the
//! caller only mutates the handle; persistence happens at commit.
//!
//! Which adapter a repository uses is chosen once, from the unit of work's
//! [`BackendKind`], by [`AccountRepositories`].

use std::collections::HashMap;
use std::sync::Arc;
use steadfast_concurrency::{Aggregate, AggregateHandle, PersistenceAdapter, UnitOfWork};
use steadfast_core::{BackendKind, Config, EntityId, Result};
use tracing::debug;

use crate::account::BankAccount;
use crate::adapters::{DocumentAccountAdapter, RelationalAccountAdapter};

/// Loads aggregates of one kind through one adapter
///
/// Keeps an identity map: finding the same id twice returns the same handle
/// without reading storage again.
pub struct Repository<'u, A: Aggregate> {
    uow: &'u mut UnitOfWork,
    adapter: Arc<dyn PersistenceAdapter<A>>,
    identity_map: HashMap<EntityId, AggregateHandle<A>>,
}

impl<'u, A: Aggregate> Repository<'u, A> {
    /// Repository reading through `uow` with `adapter`
    pub fn new(uow: &'u mut UnitOfWork, adapter: Arc<dyn PersistenceAdapter<A>>) -> Self {
        Self {
            uow,
            adapter,
            identity_map: HashMap::new(),
        }
    }

    /// Load `id` and register it with the unit of work
    ///
    /// Returns `Ok(None)` when the aggregate does not exist.
    pub async fn find(&mut self, id: &EntityId) -> Result<Option<AggregateHandle<A>>> {
        if let Some(handle) = self.identity_map.get(id) {
            return Ok(Some(handle.clone()));
        }

        let session = self.uow.session_mut()?;
        let Some(aggregate) = self.adapter.find(session, id).await? else {
            debug!(kind = A::KIND, entity = %id, adapter = self.adapter.name(), "aggregate not found");
            return Ok(None);
        };

        let handle = AggregateHandle::new(aggregate);
        self.uow.track(handle.clone(), Arc::clone(&self.adapter))?;
        self.identity_map.insert(id.clone(), handle.clone());
        Ok(Some(handle))
    }

    /// Adapter name
    pub fn adapter_name(&self) -> &'static str {
        self.adapter.name()
    }

    /// The unit of work this repository tracks into
    pub fn unit_of_work(&self) -> &UnitOfWork {
        self.uow
    }
}

/// Repository factory for [`BankAccount`], keyed by backend kind
///
/// Cheap to clone; holds one adapter per storage engine.
#[derive(Clone)]
pub struct AccountRepositories {
    relational: Arc<RelationalAccountAdapter>,
    document: Arc<DocumentAccountAdapter>,
}

impl AccountRepositories {
    /// Adapters over the table and collection named in `config`
    pub fn new(config: &Config) -> Self {
        Self {
            relational: Arc::new(RelationalAccountAdapter::new(config.account_table.clone())),
            document: Arc::new(DocumentAccountAdapter::new(
                config.account_collection.clone(),
            )),
        }
    }

    /// Adapter serving `backend`
    pub fn adapter(&self, backend: BackendKind) -> Arc<dyn PersistenceAdapter<BankAccount>> {
        match backend {
            BackendKind::Pessimistic | BackendKind::Unguarded => self.relational.clone(),
            BackendKind::Optimistic => self.document.clone(),
        }
    }

    /// Account repository bound to `uow`
    pub fn repository<'u>(&self, uow: &'u mut UnitOfWork) -> Repository<'u, BankAccount> {
        let adapter = self.adapter(uow.backend());
        Repository::new(uow, adapter)
    }
}

impl std::fmt::Debug for AccountRepositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRepositories")
            .field("table", &self.relational.table())
            .field("collection", &self.document.collection())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{seed_test_account, TEST_ACCOUNT_ID};
    use crate::factory::TransactionFactory;
    use steadfast_core::{Error, Money};

    fn factory(backend: BackendKind) -> TransactionFactory {
        let factory = TransactionFactory::in_memory(Config::for_backend(backend)).unwrap();
        seed_test_account(&factory, Money::from_major(10)).unwrap();
        factory
    }

    #[test]
    fn test_adapter_per_backend() {
        let repos = AccountRepositories::new(&Config::default());
        assert_eq!(repos.adapter(BackendKind::Pessimistic).name(), "relational");
        assert_eq!(repos.adapter(BackendKind::Unguarded).name(), "relational");
        assert_eq!(repos.adapter(BackendKind::Optimistic).name(), "document");
    }

    #[tokio::test]
    async fn test_find_tracks_once_and_reuses_handle() {
        for backend in BackendKind::ALL {
            let factory = factory(backend);
            let mut uow = factory.begin().await.unwrap();
            let id = EntityId::new(TEST_ACCOUNT_ID);
            {
                let mut repo = factory.accounts().repository(&mut uow);
                let first = repo.find(&id).await.unwrap().unwrap();
                let second = repo.find(&id).await.unwrap().unwrap();
                assert!(first.ptr_eq(&second));
                assert_eq!(first.with(BankAccount::balance), Money::from_major(10));
            }
            assert_eq!(uow.tracked_len(), 1);
            assert!(uow.is_tracked(BankAccount::KIND, &id));
            uow.rollback().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_second_repository_cannot_track_same_account() {
        let factory = factory(BackendKind::Optimistic);
        let accounts = factory.accounts();
        let mut uow = factory.begin().await.unwrap();
        let id = EntityId::new(TEST_ACCOUNT_ID);

        accounts.repository(&mut uow).find(&id).await.unwrap().unwrap();
        let err = accounts.repository(&mut uow).find(&id).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateTracking { .. }));
        assert_eq!(uow.tracked_len(), 1);
        uow.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_id_is_not_tracked() {
        let factory = factory(BackendKind::Pessimistic);
        let mut uow = factory.begin().await.unwrap();
        let found = factory
            .accounts()
            .repository(&mut uow)
            .find(&EntityId::new("nobody"))
            .await
            .unwrap();
        assert!(found.is_none());
        assert_eq!(uow.tracked_len(), 0);
        uow.rollback().await.unwrap();
    }
}
