//! Transaction factory
//!
//! Scoped construction of units of work. Each unit of work holds one
//! connection permit (at most `max_connections` are open at once) and one
//! backend transaction opened with the policy of the configured backend:
//!
//! | Backend | Engine | Isolation |
//! |---------|--------|-----------|
//! | `Pessimistic` | relational | `pessimistic_isolation` (repeatable read by default) |
//! | `Optimistic` | document | session transaction, default options |
//! | `Unguarded` | relational | read committed |
//!
//! [`TransactionFactory::run`] guarantees the transaction is released on
//! every exit path:
//!
//! ```text
//! f(uow) ──Ok──► commit ──Ok──► Ok(value)
//!   │              └─Err──► rollback ──► Err(commit error)
//!   ├────Err────────────────► rollback ──► Err(original error)
//!   └────panic──────────────► rollback ──► resume panic
//! ```

use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use steadfast_concurrency::{BackendSession, TransactionCoordinator, TransactionMetrics, UnitOfWork};
use steadfast_core::{BackendKind, Config, Error, Result};
use steadfast_storage::{DocumentStore, RelationalEngine};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::repository::AccountRepositories;

/// Produces units of work bound to fresh backend transactions
pub struct TransactionFactory {
    config: Config,
    relational: RelationalEngine,
    documents: DocumentStore,
    coordinator: Arc<TransactionCoordinator>,
    permits: Arc<Semaphore>,
    accounts: AccountRepositories,
}

impl TransactionFactory {
    /// Factory over the given engines
    ///
    /// Fails if `config` does not validate.
    pub fn new(config: Config, relational: RelationalEngine, documents: DocumentStore) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_connections)),
            accounts: AccountRepositories::new(&config),
            coordinator: Arc::new(TransactionCoordinator::new()),
            config,
            relational,
            documents,
        })
    }

    /// Factory over fresh, empty engines
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::new(config, RelationalEngine::new(), DocumentStore::new())
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Backend every unit of work is bound to
    pub fn backend(&self) -> BackendKind {
        self.config.backend
    }

    /// Relational engine handle
    pub fn relational(&self) -> &RelationalEngine {
        &self.relational
    }

    /// Document store handle
    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Account repository factory for this configuration
    pub fn accounts(&self) -> AccountRepositories {
        self.accounts.clone()
    }

    /// Connection permits currently free
    pub fn available_connections(&self) -> usize {
        self.permits.available_permits()
    }

    /// Transaction counters
    pub fn metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }

    /// Open a unit of work for manual commit / rollback
    ///
    /// Waits for a free connection permit. The permit is returned when the
    /// unit of work closes or is dropped.
    #[tracing::instrument(level = "debug", skip(self), fields(backend = %self.config.backend))]
    pub async fn begin(&self) -> Result<UnitOfWork> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("connection pool closed".to_string()))?;

        let session: BackendSession = match self.config.backend {
            BackendKind::Pessimistic | BackendKind::Unguarded => {
                let isolation = self.config.relational_isolation();
                debug!(%isolation, "beginning relational transaction");
                self.relational.begin(isolation).await.into()
            }
            BackendKind::Optimistic => {
                let mut session = self.documents.start_session().await;
                session.start_transaction()?;
                debug!(session = %session.id(), "beginning document transaction");
                session.into()
            }
        };

        Ok(UnitOfWork::new(self.config.backend, session, Arc::clone(&self.coordinator))?
            .with_permit(permit))
    }

    /// Run `f` inside a unit of work, committing on success
    ///
    /// Errors from `f` or from commit are returned unchanged after rollback.
    /// A panic in `f` rolls back and is then resumed.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let accounts = factory.accounts();
    /// let balance = factory
    ///     .run(move |uow| Box::pin(async move {
    ///         let account = accounts.repository(uow).find(&id).await?
    ///             .ok_or_else(|| Error::NotFound(id.clone()))?;
    ///         account.update(|a| a.withdraw(amount))?;
    ///         Ok(account.with(|a| a.balance()))
    ///     }))
    ///     .await?;
    /// ```
    #[tracing::instrument(level = "debug", skip_all, fields(backend = %self.config.backend))]
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a mut UnitOfWork) -> BoxFuture<'a, Result<T>> + Send,
    {
        let mut uow = self.begin().await?;
        let outcome = AssertUnwindSafe(f(&mut uow)).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => match uow.commit().await {
                Ok(()) => Ok(value),
                Err(e) => {
                    Self::abort(&mut uow, &e).await;
                    Err(e)
                }
            },
            Ok(Err(e)) => {
                Self::abort(&mut uow, &e).await;
                Err(e)
            }
            Err(payload) => {
                warn!(uow = uow.id(), "unit of work panicked, rolling back");
                if let Err(rollback) = uow.rollback().await {
                    error!(uow = uow.id(), error = %rollback, "rollback after panic failed");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    async fn abort(uow: &mut UnitOfWork, cause: &Error) {
        warn!(uow = uow.id(), error = %cause, "unit of work failed, rolling back");
        if let Err(rollback) = uow.rollback().await {
            error!(uow = uow.id(), error = %rollback, "rollback failed");
        }
    }
}

impl std::fmt::Debug for TransactionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionFactory")
            .field("backend", &self.config.backend)
            .field("available_connections", &self.permits.available_permits())
            .finish()
    }
}
