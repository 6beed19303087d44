//! Storage-level errors
//!
//! Engine errors are converted into [`steadfast_core::Error`] at the crate
//! boundary. The two concurrency signals keep their identity:
//! serialization failures stay `SerializationFailure`, document write
//! conflicts become `ConcurrencyConflict`.

use steadfast_core::{EntityId, Error, Version};
use thiserror::Error;

/// Errors reported by the in-memory engines
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Row was committed by another transaction after this transaction's snapshot
    #[error("could not serialize access due to concurrent update ({relation}/{key})")]
    SerializationFailure {
        /// Table name
        relation: String,
        /// Primary key of the contested row
        key: String,
    },

    /// Row-lock wait would never finish
    #[error("deadlock detected: transaction {waiter} waits on {holder}")]
    DeadlockDetected {
        /// Transaction that tried to wait
        waiter: u64,
        /// Transaction holding the lock
        holder: u64,
    },

    /// Document carries an uncommitted write from another transaction
    #[error("write conflict on {collection}/{id}")]
    WriteConflict {
        /// Collection name
        collection: String,
        /// Document `_id`
        id: String,
    },

    /// Unknown table
    #[error("relation \"{0}\" does not exist")]
    UndefinedTable(String),

    /// Unknown collection
    #[error("collection \"{0}\" does not exist")]
    UndefinedCollection(String),

    /// Primary key already present
    #[error("duplicate key {key} in {relation}")]
    DuplicateKey {
        /// Table or collection
        relation: String,
        /// Offending key
        key: String,
    },

    /// Row or document lacks its primary key
    #[error("missing primary key column {column} for {relation}")]
    MissingPrimaryKey {
        /// Table or collection
        relation: String,
        /// Primary key column
        column: String,
    },

    /// Update tried to change an immutable field such as `_id`
    #[error("performing an update on the path '{0}' would modify an immutable field")]
    ImmutableField(String),

    /// Operation on a transaction that already committed or rolled back
    #[error("transaction is already {0}")]
    TransactionClosed(&'static str),

    /// Session operation requiring an active transaction
    #[error("no transaction started")]
    NoTransaction,

    /// `start_transaction` while one is running
    #[error("transaction already in progress")]
    TransactionInProgress,
}

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// True for errors that signal a lost race with another transaction
    pub fn is_concurrency(&self) -> bool {
        matches!(
            self,
            StorageError::SerializationFailure { .. }
                | StorageError::DeadlockDetected { .. }
                | StorageError::WriteConflict { .. }
        )
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::SerializationFailure { .. } | StorageError::DeadlockDetected { .. } => {
                Error::SerializationFailure(e.to_string())
            }
            StorageError::WriteConflict { id, .. } => Error::ConcurrencyConflict {
                entity: EntityId::new(id),
                // The conflicting writer never saw our version; report the
                // smallest one so callers know nothing was written.
                expected_version: Version::new(0),
            },
            other => Error::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_failure_maps_to_core() {
        let err: Error = StorageError::SerializationFailure {
            relation: "bank_account".into(),
            key: "a".into(),
        }
        .into();
        assert!(matches!(err, Error::SerializationFailure(ref m) if m.contains("concurrent update")));
    }

    #[test]
    fn test_write_conflict_maps_to_concurrency_conflict() {
        let err: Error = StorageError::WriteConflict {
            collection: "bank_account".into(),
            id: "a".into(),
        }
        .into();
        assert!(matches!(err, Error::ConcurrencyConflict { ref entity, .. } if entity.as_str() == "a"));
    }

    #[test]
    fn test_other_errors_map_to_storage() {
        let err: Error = StorageError::UndefinedTable("t".into()).into();
        assert!(matches!(err, Error::Storage(_)));
        assert!(!StorageError::NoTransaction.is_concurrency());
    }
}
