//! Account persistence adapters
//!
//! | Adapter | Backend kinds | Lost-update protection |
//! |---------|---------------|------------------------|
//! | [`RelationalAccountAdapter`] | `Pessimistic`, `Unguarded` | transaction isolation level (none at read committed) |
//! | [`DocumentAccountAdapter`] | `Optimistic` | version in the update filter |
//!
//! Both write `version + 1`. Neither touches the in-memory aggregate.

pub mod document;
pub mod relational;

pub use document::DocumentAccountAdapter;
pub use relational::RelationalAccountAdapter;
