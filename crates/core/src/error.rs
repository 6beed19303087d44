//! Unified error types for steadfast.
//!
//! Every layer of the workspace reports failures through [`Error`]. The
//! variants follow the taxonomy of the consistency core:
//!
//! | Variant | Raised by | Retry? |
//! |---------|-----------|--------|
//! | `DomainRuleViolation` | aggregate mutators, before any persistence | never |
//! | `ConcurrencyConflict` | optimistic adapter when the version check matches nothing | caller decides |
//! | `SerializationFailure` | relational engine under repeatable read / serializable | caller decides |
//! | `NotFound` | workflows that require an aggregate to exist | no |
//!
//! Repositories never raise `NotFound` themselves: absence is returned as `None`.

use crate::types::{EntityId, Money, Version};
use thiserror::Error;

/// Business-rule violations raised by aggregate mutators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Withdrawal larger than the available balance
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Amount the caller tried to withdraw
        requested: Money,
        /// Balance at the time of the attempt
        available: Money,
    },

    /// Account balances may not go below zero
    #[error("balance may not be negative, got {0}")]
    NegativeBalance(Money),

    /// Amounts must be strictly positive
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Money),

    /// Arithmetic would leave the representable range
    #[error("amount overflow")]
    Overflow,
}

/// All steadfast errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A business invariant would be broken by the requested mutation
    #[error("domain rule violation: {0}")]
    DomainRuleViolation(#[from] DomainError),

    /// The optimistic version check found no row at the expected version
    #[error("serialization error due to concurrent update of {entity} (expected {expected_version})")]
    ConcurrencyConflict {
        /// Aggregate whose write lost the race
        entity: EntityId,
        /// Version read at `find` time
        expected_version: Version,
    },

    /// The storage engine aborted the transaction to preserve isolation
    #[error("serialization failure: {0}")]
    SerializationFailure(String),

    /// A required aggregate does not exist
    #[error("not found: {0}")]
    NotFound(EntityId),

    /// Unit of work used outside its valid state
    #[error("invalid unit of work state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation requires
        expected: &'static str,
        /// State the unit of work is in
        actual: &'static str,
    },

    /// The same aggregate was registered twice in one unit of work
    #[error("aggregate {kind}/{entity} is already tracked by this unit of work")]
    DuplicateTracking {
        /// Aggregate kind
        kind: &'static str,
        /// Aggregate identity
        entity: EntityId,
    },

    /// An adapter was handed a session of the wrong backend
    #[error("backend mismatch: adapter expects {expected}, session is {actual}")]
    BackendMismatch {
        /// Backend the adapter was built for
        expected: &'static str,
        /// Backend of the session it received
        actual: &'static str,
    },

    /// Storage engine failure that is not a concurrency signal
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for steadfast operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Retryable errors mean another transaction won a race; re-running the
    /// whole read-modify-write cycle with fresh data may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConcurrencyConflict { .. } | Error::SerializationFailure(_)
        )
    }

    /// Check if this is a concurrency error of either backend.
    pub fn is_conflict(&self) -> bool {
        self.is_retryable()
    }

    /// Check if this is a business-rule violation.
    pub fn is_domain_violation(&self) -> bool {
        matches!(self, Error::DomainRuleViolation(_))
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_mentions_concurrent_update() {
        let err = Error::ConcurrencyConflict {
            entity: EntityId::new("a"),
            expected_version: Version::INITIAL,
        };
        assert!(err.to_string().contains("concurrent update"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_domain_error_converts() {
        let err: Error = DomainError::NonPositiveAmount(Money::ZERO).into();
        assert!(err.is_domain_violation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_serialization_failure_is_retryable() {
        let err = Error::SerializationFailure("could not serialize access".into());
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
    }
}
