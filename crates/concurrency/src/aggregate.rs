//! Aggregate contract
//!
//! An aggregate is a versioned entity and the unit of persistence. Domain
//! mutators live on the concrete type; the version is only ever advanced by
//! the unit of work after a successful commit. That restriction is enforced
//! by [`VersionToken`]: `advance_version` takes one by value, and tokens can
//! only be created inside this crate.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use steadfast_core::{EntityId, Version};

/// Permission to advance an aggregate's version by exactly one
///
/// Not constructible outside `steadfast-concurrency`.
#[derive(Debug)]
pub struct VersionToken {
    _private: (),
}

impl VersionToken {
    pub(crate) fn issue() -> Self {
        Self { _private: () }
    }
}

/// A versioned domain entity
pub trait Aggregate: Clone + fmt::Debug + Send + Sync + 'static {
    /// Aggregate type name, used together with the id as tracking identity
    const KIND: &'static str;

    /// Immutable identity
    fn entity_id(&self) -> &EntityId;

    /// Version as last read from or written to storage
    fn version(&self) -> Version;

    /// Increment the version by exactly one
    fn advance_version(&mut self, token: VersionToken);
}

/// Shared handle to an aggregate tracked by a unit of work
///
/// The unit of work and the caller hold clones of the same handle, so
/// in-memory mutations made through [`AggregateHandle::update`] are what
/// gets persisted at commit. Access goes through closures so the inner lock
/// can never be held across an `.await`.
pub struct AggregateHandle<A> {
    inner: Arc<Mutex<A>>,
}

impl<A: Aggregate> AggregateHandle<A> {
    /// Wrap a freshly materialized aggregate
    pub fn new(aggregate: A) -> Self {
        Self {
            inner: Arc::new(Mutex::new(aggregate)),
        }
    }

    /// Read access
    pub fn with<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Mutable access, for domain operations
    pub fn update<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> A {
        self.inner.lock().clone()
    }

    /// Identity of the wrapped aggregate
    pub fn entity_id(&self) -> EntityId {
        self.inner.lock().entity_id().clone()
    }

    /// Current version
    pub fn version(&self) -> Version {
        self.inner.lock().version()
    }

    /// True if both handles point at the same tracked instance
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn advance_version(&self) {
        self.inner.lock().advance_version(VersionToken::issue());
    }
}

impl<A> Clone for AggregateHandle<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Aggregate> fmt::Debug for AggregateHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AggregateHandle").field(&*self.inner.lock()).finish()
    }
}
