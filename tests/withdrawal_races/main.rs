//! Withdrawal Race Tests
//!
//! Two withdrawals of the full balance race against one account. The
//! guarded backends let exactly one through; the unguarded backend commits
//! both and loses an update.
//!
//! All tests run on tokio's paused clock, so the 1s / 2s delays are virtual.

#[path = "../common/mod.rs"]
mod common;

mod optimistic;
mod pessimistic;
mod properties;
mod unguarded;
