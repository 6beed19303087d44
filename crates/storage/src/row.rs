//! Row model of the relational engine
//!
//! A [`Row`] is a column-name → [`Datum`] map. Updates are expressed as a
//! partial row of assignments (`SET col = value, ...`) and a [`RowFilter`]
//! (`WHERE pk = ? AND col = ? ...`).

use std::collections::BTreeMap;
use std::fmt;
use steadfast_core::Money;

/// A single column value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum {
    /// SQL NULL
    Null,
    /// 64-bit integer
    Int(i64),
    /// Fixed-point numeric with two fractional digits
    Numeric(Money),
    /// Variable-length text
    Text(String),
}

impl Datum {
    /// Integer payload, if this is an `Int`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Datum::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric payload, if this is a `Numeric`
    pub fn as_numeric(&self) -> Option<Money> {
        match self {
            Datum::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload, if this is a `Text`
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Datum::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("NULL"),
            Datum::Int(v) => write!(f, "{}", v),
            Datum::Numeric(v) => write!(f, "{}", v),
            Datum::Text(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int(v)
    }
}

impl From<i32> for Datum {
    fn from(v: i32) -> Self {
        Datum::Int(i64::from(v))
    }
}

impl From<Money> for Datum {
    fn from(v: Money) -> Self {
        Datum::Numeric(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Text(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::Text(v)
    }
}

/// A table row, or a set of column assignments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: BTreeMap<String, Datum>,
}

impl Row {
    /// Empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column assignment
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Datum>) -> Self {
        self.set(column, value);
        self
    }

    /// Assign a column
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Datum>) {
        self.columns.insert(column.into(), value.into());
    }

    /// Column value, `None` if the column is absent
    pub fn get(&self, column: &str) -> Option<&Datum> {
        self.columns.get(column)
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate columns in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Datum)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overlay `assignments` onto this row
    pub(crate) fn apply(&mut self, assignments: &Row) {
        for (column, value) in &assignments.columns {
            self.columns.insert(column.clone(), value.clone());
        }
    }
}

/// `WHERE <pk> = key [AND column = value ...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    key: String,
    conditions: Vec<(String, Datum)>,
}

impl RowFilter {
    /// Match the row whose primary key equals `key`
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            conditions: Vec::new(),
        }
    }

    /// Additionally require `column = value`
    pub fn and_eq(mut self, column: impl Into<String>, value: impl Into<Datum>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    /// Primary key this filter targets
    pub fn primary_key(&self) -> &str {
        &self.key
    }

    /// True if every extra condition holds on `row`
    pub(crate) fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }
}
