//! Convenient imports for steadfast.
//!
//! ```ignore
//! use steadfast::prelude::*;
//!
//! let db = Steadfast::in_memory(BackendKind::Pessimistic)?;
//! ```

// Main entry point
pub use crate::database::{Steadfast, SteadfastBuilder};

// Error handling
pub use steadfast_core::{DomainError, Error, Result};

// Core types
pub use steadfast_core::{BackendKind, Config, EntityId, IsolationLevel, Money, Version};

// Unit of work
pub use steadfast_concurrency::{Aggregate, AggregateHandle, UnitOfWork, UowState};
pub use steadfast_engine::{
    AccountRepositories, BankAccount, TransactionFactory, TEST_ACCOUNT_BALANCE, TEST_ACCOUNT_ID,
};

// Workflows
pub use crate::workflow::{run_withdrawal_race, RaceReport, WithdrawalOutcome};

pub use std::time::Duration;
