//! Backend selection and transaction policy
//!
//! [`Config`] decides which concurrency-control strategy a
//! `TransactionFactory` binds its units of work to. Configuration comes from
//! defaults, a TOML document, and `STEADFAST_*` environment overrides, applied
//! in that order.
//!
//! ```toml
//! backend = "optimistic"
//! pessimistic_isolation = "serializable"
//! max_connections = 4
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Environment variable overriding [`Config::backend`]
pub const ENV_BACKEND: &str = "STEADFAST_BACKEND";
/// Environment variable overriding [`Config::max_connections`]
pub const ENV_MAX_CONNECTIONS: &str = "STEADFAST_MAX_CONNECTIONS";

/// Concurrency-control strategy, chosen at unit-of-work construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Relational engine, isolation level prevents lost updates
    Pessimistic,
    /// Document store, version-checked conditional writes
    Optimistic,
    /// Relational engine at read committed with unconditional writes.
    /// Exhibits the lost-update anomaly; kept as a negative control.
    Unguarded,
}

impl BackendKind {
    /// All backend kinds
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Pessimistic,
        BackendKind::Optimistic,
        BackendKind::Unguarded,
    ];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Pessimistic => "pessimistic",
            BackendKind::Optimistic => "optimistic",
            BackendKind::Unguarded => "unguarded",
        }
    }

    /// True if the kind runs on the relational engine
    pub fn is_relational(&self) -> bool {
        !matches!(self, BackendKind::Optimistic)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pessimistic" | "relational" => Ok(BackendKind::Pessimistic),
            "optimistic" | "document" => Ok(BackendKind::Optimistic),
            "unguarded" | "naive" => Ok(BackendKind::Unguarded),
            other => Err(Error::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Transaction isolation level of the relational engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Each statement sees the latest committed data
    ReadCommitted,
    /// Snapshot taken at transaction start; concurrent updates abort the writer
    RepeatableRead,
    /// Strongest level; behaves like repeatable read for single-row workloads
    Serializable,
}

impl IsolationLevel {
    /// True for levels that read from a transaction-start snapshot
    pub fn uses_snapshot(&self) -> bool {
        !matches!(self, IsolationLevel::ReadCommitted)
    }

    /// Stable name
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "read_committed",
            IsolationLevel::RepeatableRead => "repeatable_read",
            IsolationLevel::Serializable => "serializable",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Strategy used by new units of work
    pub backend: BackendKind,
    /// Isolation requested by the pessimistic backend
    pub pessimistic_isolation: IsolationLevel,
    /// Upper bound on concurrently open units of work
    pub max_connections: usize,
    /// Relational table holding bank accounts
    pub account_table: String,
    /// Document collection holding bank accounts
    pub account_collection: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Pessimistic,
            pessimistic_isolation: IsolationLevel::RepeatableRead,
            max_connections: 10,
            account_table: "bank_account".to_string(),
            account_collection: "bank_account".to_string(),
        }
    }
}

impl Config {
    /// Default configuration for a given backend
    pub fn for_backend(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Apply `STEADFAST_*` overrides from the process environment
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup(ENV_BACKEND) {
            self.backend = backend.parse()?;
        }
        if let Some(max) = lookup(ENV_MAX_CONNECTIONS) {
            self.max_connections = max.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be an integer, got '{}'", ENV_MAX_CONNECTIONS, max))
            })?;
        }
        self.validate()?;
        tracing::debug!(backend = %self.backend, max_connections = self.max_connections, "configuration resolved");
        Ok(self)
    }

    /// Isolation level a new relational transaction should request
    ///
    /// The unguarded backend always uses read committed, whatever
    /// `pessimistic_isolation` says.
    pub fn relational_isolation(&self) -> IsolationLevel {
        match self.backend {
            BackendKind::Unguarded => IsolationLevel::ReadCommitted,
            _ => self.pessimistic_isolation,
        }
    }

    /// Check invariants between fields
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be at least 1".into()));
        }
        if !self.pessimistic_isolation.uses_snapshot() {
            return Err(Error::Config(
                "pessimistic_isolation must be repeatable_read or serializable".into(),
            ));
        }
        if self.account_table.is_empty() || self.account_collection.is_empty() {
            return Err(Error::Config("account table and collection names must be non-empty".into()));
        }
        Ok(())
    }
}
