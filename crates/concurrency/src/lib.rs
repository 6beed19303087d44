//! Concurrency layer for steadfast
//!
//! This crate implements the unit-of-work half of the consistency core:
//! - [`Aggregate`]: versioned entity contract, with version advancement gated
//!   by a [`VersionToken`] only this crate can mint
//! - [`AggregateHandle`]: shared reference to a tracked aggregate
//! - [`BackendSession`]: the relational and document transaction bindings
//! - [`PersistenceAdapter`]: backend-specific find / update of one aggregate kind
//! - [`UnitOfWork`]: tracked-set plus transaction lifecycle
//! - [`TransactionCoordinator`]: commit / abort / conflict accounting

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod aggregate;
pub mod manager;
pub mod session;
pub mod unit_of_work;

pub use adapter::PersistenceAdapter;
pub use aggregate::{Aggregate, AggregateHandle, VersionToken};
pub use manager::{TransactionCoordinator, TransactionMetrics};
pub use session::BackendSession;
pub use unit_of_work::{UnitOfWork, UowState};
