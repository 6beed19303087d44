//! # Steadfast
//!
//! Unit-of-Work transactional core with pessimistic and optimistic
//! concurrency control.
//!
//! Aggregates are loaded through a repository into a unit of work, mutated in
//! memory, and written back when the unit of work commits. Two strategies
//! keep concurrent read-modify-write cycles from losing updates:
//!
//! - **Pessimistic**: a relational transaction at repeatable read (or
//!   serializable); the engine aborts the later of two conflicting writers.
//! - **Optimistic**: a document-store transaction whose update is conditional
//!   on the version read earlier; a stale version is a concurrency conflict.
//!
//! A third backend, **Unguarded**, runs at read committed with unconditional
//! writes and shows the anomaly the other two prevent.
//!
//! ## Quick Start
//!
//! ```ignore
//! use steadfast::prelude::*;
//!
//! let db = Steadfast::in_memory(BackendKind::Optimistic)?;
//! db.seed_test_account(TEST_ACCOUNT_BALANCE)?;
//!
//! let report = run_withdrawal_race(
//!     &db,
//!     TEST_ACCOUNT_BALANCE,
//!     TEST_ACCOUNT_BALANCE,
//!     &[Duration::from_secs(1), Duration::from_secs(2)],
//! )
//! .await?;
//! assert_eq!(report.successes(), 1);
//! ```
//!
//! ## Layers
//!
//! - [`steadfast_core`]: ids, versions, money, configuration, errors
//! - [`steadfast_storage`]: in-memory relational engine and document store
//! - [`steadfast_concurrency`]: aggregates, unit of work, adapter contract
//! - [`steadfast_engine`]: bank account, adapters, repositories, factory

#![warn(missing_docs)]

mod database;

pub mod prelude;
pub mod workflow;

// Re-export main entry points
pub use database::{Steadfast, SteadfastBuilder, SteadfastMetrics};
pub use steadfast_core::{DomainError, Error, Result};
