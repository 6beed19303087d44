//! Core types for aggregates
//!
//! This module defines the fundamental types used throughout the system:
//! - [`EntityId`]: Immutable identity of an aggregate
//! - [`Version`]: Optimistic-concurrency version counter
//! - [`Money`]: Fixed-point monetary amount with two fractional digits

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an aggregate
///
/// EntityId is the primary key of a persisted aggregate. It is used as:
/// - the row key in the relational engine
/// - the `_id` field in the document store
/// - the identity-map key inside a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an EntityId from any string-like value
    ///
    /// # Examples
    ///
    /// ```
    /// use steadfast_core::EntityId;
    ///
    /// let id = EntityId::new("test_account_id");
    /// assert_eq!(id.as_str(), "test_account_id");
    /// ```
    pub fn new(id: impl Into<String>) -> Self {
        EntityId(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}

/// Aggregate version
///
/// Starts at [`Version::INITIAL`] and is advanced by exactly one for every
/// successful persistence cycle. The value stored alongside the aggregate is
/// what the optimistic backend matches on when writing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version assigned to a freshly provisioned aggregate
    pub const INITIAL: Version = Version(1);

    /// Wrap a raw version number
    pub const fn new(v: u64) -> Self {
        Version(v)
    }

    /// Raw version number
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The version following this one
    ///
    /// # Examples
    ///
    /// ```
    /// use steadfast_core::Version;
    ///
    /// assert_eq!(Version::INITIAL.next(), Version::new(2));
    /// ```
    pub const fn next(self) -> Self {
        Version(self.0 + 1)
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Monetary amount in minor units (cents)
///
/// Balances are persisted as `NUMERIC(20, 2)`-style fixed-point values, so the
/// amount is kept as an integer count of hundredths to avoid float drift.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero amount
    pub const ZERO: Money = Money(0);

    /// Amount from whole currency units
    ///
    /// # Examples
    ///
    /// ```
    /// use steadfast_core::Money;
    ///
    /// assert_eq!(Money::from_major(100_000).minor_units(), 10_000_000);
    /// ```
    pub const fn from_major(units: i64) -> Self {
        Money(units * 100)
    }

    /// Amount from minor units (hundredths)
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Amount in minor units
    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// True if strictly greater than zero
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// True if strictly less than zero
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Subtraction, `None` on overflow
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Addition, `None` on overflow
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}
