//! Unit of Work Integration Tests
//!
//! Lifecycle, version advancement and persistence round trips through the
//! public facade, on every backend.

#[path = "../common/mod.rs"]
mod common;

mod lifecycle;
mod versioning;
