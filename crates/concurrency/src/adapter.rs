//! Backend adapter contract
//!
//! One adapter per (aggregate kind, backend) pair. The unit of work stores
//! each tracked aggregate next to the adapter that loaded it and calls
//! [`PersistenceAdapter::update`] on commit. Which adapter to use is decided
//! once, from the configured `BackendKind`, by the repository factory.

use async_trait::async_trait;
use steadfast_core::{EntityId, Result, Version};

use crate::aggregate::Aggregate;
use crate::session::BackendSession;

/// Loads and writes back one aggregate kind through one backend
#[async_trait]
pub trait PersistenceAdapter<A: Aggregate>: Send + Sync {
    /// Adapter name for logs
    fn name(&self) -> &'static str;

    /// Read the persisted state of `id`; `None` if it does not exist
    async fn find(&self, session: &mut BackendSession, id: &EntityId) -> Result<Option<A>>;

    /// Write `aggregate` back with its version set to `next_version`
    ///
    /// `aggregate.version()` is the version read at `find` time. The adapter
    /// must not advance the in-memory version itself; the unit of work does
    /// that once the transaction has committed.
    async fn update(
        &self,
        session: &mut BackendSession,
        aggregate: &A,
        next_version: Version,
    ) -> Result<()>;
}
