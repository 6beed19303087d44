//! Main entry point for steadfast.
//!
//! This module provides the `Steadfast` struct, which owns the storage
//! engines and the transaction factory for one backend configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use steadfast_concurrency::UnitOfWork;
use steadfast_core::{BackendKind, Config, EntityId, IsolationLevel, Money, Result};
use steadfast_engine::{bootstrap, AccountRepositories, BankAccount, TransactionFactory};

use crate::workflow;

/// A steadfast instance.
///
/// Create one with [`Steadfast::in_memory`] or [`Steadfast::builder`].
/// Cloning is cheap; clones share engines, connection permits and metrics.
///
/// # Example
///
/// ```ignore
/// use steadfast::prelude::*;
///
/// let db = Steadfast::builder()
///     .backend(BackendKind::Optimistic)
///     .open()?;
/// db.seed_test_account(Money::from_major(100_000))?;
///
/// let balance = db
///     .withdraw(&EntityId::new(TEST_ACCOUNT_ID), Money::from_major(10), Duration::ZERO)
///     .await?;
/// ```
#[derive(Clone)]
pub struct Steadfast {
    factory: Arc<TransactionFactory>,
}

impl Steadfast {
    /// Open an instance over fresh in-memory engines for `backend`.
    pub fn in_memory(backend: BackendKind) -> Result<Self> {
        Self::builder().backend(backend).open()
    }

    /// Open an instance with an explicit configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self {
            factory: Arc::new(TransactionFactory::in_memory(config)?),
        })
    }

    /// Create a builder for instance configuration.
    pub fn builder() -> SteadfastBuilder {
        SteadfastBuilder::new()
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        self.factory.config()
    }

    /// Backend every unit of work is bound to.
    pub fn backend(&self) -> BackendKind {
        self.factory.backend()
    }

    /// The underlying transaction factory.
    pub fn factory(&self) -> &TransactionFactory {
        &self.factory
    }

    /// Account repository factory.
    pub fn accounts(&self) -> AccountRepositories {
        self.factory.accounts()
    }

    /// Open a unit of work for manual commit / rollback.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        self.factory.begin().await
    }

    /// Run `f` in a unit of work. See [`TransactionFactory::run`].
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a mut UnitOfWork) -> BoxFuture<'a, Result<T>> + Send,
    {
        self.factory.run(f).await
    }

    /// Reset both engines and create the scenario account.
    pub fn seed_test_account(&self, balance: Money) -> Result<BankAccount> {
        bootstrap::seed_test_account(&self.factory, balance)
    }

    /// Insert an account outside any unit of work.
    pub fn insert_account(&self, account: &BankAccount) -> Result<()> {
        bootstrap::insert_account(&self.factory, account)
    }

    /// Latest committed state of an account.
    pub fn account(&self, id: &EntityId) -> Result<Option<BankAccount>> {
        bootstrap::load_committed(&self.factory, id)
    }

    /// Withdraw `amount` from `id` in its own unit of work.
    ///
    /// `delay` is spent between reading the account and committing, which
    /// is where a concurrent writer can slip in. Returns the new balance.
    pub async fn withdraw(&self, id: &EntityId, amount: Money, delay: Duration) -> Result<Money> {
        let accounts = self.accounts();
        let id = id.clone();
        self.run(move |uow| {
            Box::pin(async move { workflow::withdraw(uow, &accounts, &id, amount, delay).await })
        })
        .await
    }

    /// Deposit `amount` into `id` in its own unit of work.
    pub async fn deposit(&self, id: &EntityId, amount: Money) -> Result<Money> {
        let accounts = self.accounts();
        let id = id.clone();
        self.run(move |uow| {
            Box::pin(async move { workflow::deposit(uow, &accounts, &id, amount).await })
        })
        .await
    }

    /// Get transaction metrics.
    pub fn metrics(&self) -> SteadfastMetrics {
        let txn_metrics = self.factory.metrics();
        SteadfastMetrics {
            transactions_committed: txn_metrics.total_committed,
            transactions_aborted: txn_metrics.total_aborted,
            transactions_conflicted: txn_metrics.total_conflicts,
            transactions_active: txn_metrics.active_count,
            commit_rate: txn_metrics.commit_rate,
        }
    }
}

impl std::fmt::Debug for Steadfast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Steadfast").field("factory", &self.factory).finish()
    }
}

/// Transaction metrics.
#[derive(Debug, Clone)]
pub struct SteadfastMetrics {
    /// Total committed units of work
    pub transactions_committed: u64,
    /// Total rolled back or abandoned units of work
    pub transactions_aborted: u64,
    /// Aborts caused by a concurrency conflict
    pub transactions_conflicted: u64,
    /// Currently open units of work
    pub transactions_active: u64,
    /// Commit success rate (0.0 - 1.0)
    pub commit_rate: f64,
}

/// Builder for instance configuration.
///
/// Sources are layered: base configuration (default, [`config`](Self::config)
/// or [`config_file`](Self::config_file)), then `STEADFAST_*` environment
/// variables if [`from_env`](Self::from_env) was called, then the explicit
/// setters.
///
/// # Example
///
/// ```ignore
/// let db = Steadfast::builder()
///     .config_file("steadfast.toml")
///     .from_env()
///     .max_connections(4)
///     .open()?;
/// ```
#[derive(Debug, Default)]
pub struct SteadfastBuilder {
    base: Option<Config>,
    config_file: Option<PathBuf>,
    use_env: bool,
    backend: Option<BackendKind>,
    isolation: Option<IsolationLevel>,
    max_connections: Option<usize>,
}

impl SteadfastBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an explicit configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.base = Some(config);
        self
    }

    /// Start from a TOML file. Takes precedence over [`config`](Self::config).
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Apply `STEADFAST_BACKEND` and `STEADFAST_MAX_CONNECTIONS`.
    pub fn from_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Select the concurrency-control strategy.
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Isolation level of pessimistic transactions.
    pub fn pessimistic_isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Maximum number of concurrently open units of work.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Resolve the layered configuration without opening anything.
    pub fn build_config(self) -> Result<Config> {
        let mut config = match (&self.config_file, self.base) {
            (Some(path), _) => Config::from_file(path)?,
            (None, Some(config)) => config,
            (None, None) => Config::default(),
        };
        if self.use_env {
            config = config.apply_env()?;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(level) = self.isolation {
            config.pessimistic_isolation = level;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        config.validate()?;
        Ok(config)
    }

    /// Open the instance.
    pub fn open(self) -> Result<Steadfast> {
        Steadfast::with_config(self.build_config()?)
    }
}
