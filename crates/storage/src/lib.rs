//! Storage engines for steadfast
//!
//! This crate implements the two transactional stores the consistency core
//! runs against. Both are in-memory and model only the behavior the core
//! depends on:
//! - [`RelationalEngine`]: rows with snapshot reads and per-transaction
//!   isolation levels; first-updater-wins row conflicts surface as
//!   [`StorageError::SerializationFailure`]
//! - [`DocumentStore`]: JSON documents, sessions with multi-statement
//!   transactions, and `update_one` reporting matched/modified counts
//!
//! Neither engine parses queries, maintains indexes, or persists to disk.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod relational;
pub mod row;

pub use document::{Document, DocumentSession, DocumentStore, UpdateResult};
pub use error::{StorageError, StorageResult};
pub use relational::{RelationalEngine, RelationalTransaction, TxnId};
pub use row::{Datum, Row, RowFilter};
