//! Unit of Work
//!
//! A unit of work owns one backend transaction and the ordered set of
//! aggregates loaded through it.
//!
//! ```text
//!            track*              all updates ok, session commit ok
//!   Open ──────────► Committing ───────────────────────────────────► Closed
//!    │                   │ update or session commit failed                ▲
//!    │                   ▼                                               │
//!    │                 Failed ──────── rollback ──► RollingBack ─────────┤
//!    └────────────────── rollback ────────────────► RollingBack ─────────┘
//! ```
//!
//! `commit` does not roll back by itself when an update fails; it leaves the
//! unit in `Failed` and returns the error. The caller (normally the
//! transaction factory) must call `rollback`, which is also safe to call on a
//! closed unit.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use steadfast_core::{BackendKind, EntityId, Error, Result};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, warn};

use crate::adapter::PersistenceAdapter;
use crate::aggregate::{Aggregate, AggregateHandle};
use crate::manager::TransactionCoordinator;
use crate::session::BackendSession;

/// Lifecycle state of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UowState {
    /// Accepting reads and `track` calls
    Open,
    /// Writing tracked aggregates
    Committing,
    /// A commit attempt failed; only `rollback` is valid
    Failed,
    /// Discarding tracked aggregates and aborting
    RollingBack,
    /// Transaction released
    Closed,
}

impl UowState {
    /// Stable name
    pub fn as_str(&self) -> &'static str {
        match self {
            UowState::Open => "open",
            UowState::Committing => "committing",
            UowState::Failed => "failed",
            UowState::RollingBack => "rolling back",
            UowState::Closed => "closed",
        }
    }
}

impl fmt::Display for UowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-erased (aggregate, adapter) pair
#[async_trait]
trait TrackedEntry: Send + Sync {
    fn kind(&self) -> &'static str;
    fn entity_id(&self) -> EntityId;
    async fn persist(&self, session: &mut BackendSession) -> Result<()>;
    fn mark_persisted(&self);
}

struct Tracked<A: Aggregate> {
    handle: AggregateHandle<A>,
    adapter: Arc<dyn PersistenceAdapter<A>>,
}

#[async_trait]
impl<A: Aggregate> TrackedEntry for Tracked<A> {
    fn kind(&self) -> &'static str {
        A::KIND
    }

    fn entity_id(&self) -> EntityId {
        self.handle.entity_id()
    }

    async fn persist(&self, session: &mut BackendSession) -> Result<()> {
        let snapshot = self.handle.snapshot();
        let next = snapshot.version().next();
        debug!(
            kind = A::KIND,
            entity = %snapshot.entity_id(),
            from = %snapshot.version(),
            to = %next,
            adapter = self.adapter.name(),
            "persisting aggregate"
        );
        self.adapter.update(session, &snapshot, next).await
    }

    fn mark_persisted(&self) {
        self.handle.advance_version();
    }
}

/// One transaction lifetime and the aggregates touched during it
pub struct UnitOfWork {
    id: u64,
    backend: BackendKind,
    session: BackendSession,
    /// Insertion order = persistence order
    tracked: Vec<Box<dyn TrackedEntry>>,
    state: UowState,
    coordinator: Arc<TransactionCoordinator>,
    permit: Option<OwnedSemaphorePermit>,
}

impl UnitOfWork {
    /// Bind a unit of work to an open backend session
    ///
    /// Fails with `BackendMismatch` if `session` is not the binding
    /// `backend` runs on.
    pub fn new(
        backend: BackendKind,
        session: BackendSession,
        coordinator: Arc<TransactionCoordinator>,
    ) -> Result<Self> {
        let expected = if backend.is_relational() {
            "relational"
        } else {
            "document"
        };
        if session.name() != expected {
            return Err(Error::BackendMismatch {
                expected,
                actual: session.name(),
            });
        }

        let id = coordinator.begin();
        debug!(uow = id, %backend, "unit of work opened");
        Ok(Self {
            id,
            backend,
            session,
            tracked: Vec::new(),
            state: UowState::Open,
            coordinator,
            permit: None,
        })
    }

    /// Attach a connection permit, released when the unit closes
    pub fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self.permit = Some(permit);
        self
    }

    /// Unit-of-work id, unique per coordinator
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Strategy this unit was built for
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Current lifecycle state
    pub fn state(&self) -> UowState {
        self.state
    }

    /// Number of tracked aggregates
    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    /// True if an aggregate of `kind` with `id` is tracked
    pub fn is_tracked(&self, kind: &str, id: &EntityId) -> bool {
        self.tracked
            .iter()
            .any(|e| e.kind() == kind && &e.entity_id() == id)
    }

    fn expect_state(&self, expected: UowState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }

    /// Backend session, for adapters reading through this unit
    pub fn session_mut(&mut self) -> Result<&mut BackendSession> {
        self.expect_state(UowState::Open)?;
        Ok(&mut self.session)
    }

    /// Register an aggregate for persistence at commit
    ///
    /// Rejects a second registration of the same kind and id.
    pub fn track<A: Aggregate>(
        &mut self,
        handle: AggregateHandle<A>,
        adapter: Arc<dyn PersistenceAdapter<A>>,
    ) -> Result<()> {
        self.expect_state(UowState::Open)?;
        let entity = handle.entity_id();
        if self.is_tracked(A::KIND, &entity) {
            return Err(Error::DuplicateTracking {
                kind: A::KIND,
                entity,
            });
        }
        debug!(uow = self.id, kind = A::KIND, entity = %entity, "tracking aggregate");
        self.tracked.push(Box::new(Tracked { handle, adapter }));
        Ok(())
    }

    /// Persist every tracked aggregate in tracking order, then commit
    ///
    /// On success each tracked aggregate's version has advanced by one.
    #[tracing::instrument(level = "debug", skip(self), fields(uow = self.id, backend = %self.backend))]
    pub async fn commit(&mut self) -> Result<()> {
        self.expect_state(UowState::Open)?;
        self.state = UowState::Committing;

        let mut failure = None;
        for entry in &self.tracked {
            if let Err(e) = entry.persist(&mut self.session).await {
                failure = Some(e);
                break;
            }
        }
        if let Some(e) = failure {
            return Err(self.fail(e, "tracked update failed"));
        }

        let persisted = std::mem::take(&mut self.tracked);
        if let Err(e) = self.session.commit().await {
            return Err(self.fail(e, "transaction commit failed"));
        }

        for entry in &persisted {
            entry.mark_persisted();
        }
        self.close();
        self.coordinator.record_commit();
        info!(uow = self.id, backend = %self.backend, persisted = persisted.len(), "unit of work committed");
        Ok(())
    }

    fn fail(&mut self, error: Error, what: &'static str) -> Error {
        self.state = UowState::Failed;
        if error.is_conflict() {
            self.coordinator.record_conflict();
        }
        warn!(uow = self.id, backend = %self.backend, error = %error, "{}", what);
        error
    }

    /// Discard tracked aggregates and abort the transaction
    ///
    /// No-op on a closed unit.
    #[tracing::instrument(level = "debug", skip(self), fields(uow = self.id, backend = %self.backend))]
    pub async fn rollback(&mut self) -> Result<()> {
        match self.state {
            UowState::Closed => return Ok(()),
            UowState::Open | UowState::Failed => {}
            UowState::Committing | UowState::RollingBack => {
                return Err(Error::InvalidState {
                    expected: "open or failed",
                    actual: self.state.as_str(),
                })
            }
        }

        self.state = UowState::RollingBack;
        let discarded = self.tracked.len();
        self.tracked.clear();
        let result = self.session.rollback().await;
        self.close();
        self.coordinator.record_abort();
        info!(uow = self.id, backend = %self.backend, discarded, "unit of work rolled back");
        result
    }

    fn close(&mut self) {
        self.state = UowState::Closed;
        self.permit = None;
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.state != UowState::Closed {
            // The session's own Drop aborts the storage transaction.
            warn!(uow = self.id, state = %self.state, "unit of work dropped before commit or rollback");
            self.coordinator.record_abort();
        }
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("backend", &self.backend)
            .field("state", &self.state)
            .field("tracked", &self.tracked.len())
            .finish()
    }
}
