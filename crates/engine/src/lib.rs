//! Engine layer for steadfast
//!
//! Wires the unit-of-work machinery to concrete storage:
//! - [`BankAccount`]: the account aggregate
//! - [`RelationalAccountAdapter`] / [`DocumentAccountAdapter`]: pessimistic
//!   and optimistic persistence of accounts
//! - [`Repository`] and [`AccountRepositories`]: tracked loading, with the
//!   adapter selected by [`BackendKind`](steadfast_core::BackendKind)
//! - [`TransactionFactory`]: scoped units of work with guaranteed cleanup
//! - [`bootstrap`]: scenario fixtures

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod account;
pub mod adapters;
pub mod bootstrap;
pub mod factory;
pub mod repository;

pub use account::BankAccount;
pub use adapters::{DocumentAccountAdapter, RelationalAccountAdapter};
pub use bootstrap::{TEST_ACCOUNT_BALANCE, TEST_ACCOUNT_ID};
pub use factory::TransactionFactory;
pub use repository::{AccountRepositories, Repository};
