//! Core types for steadfast
//!
//! This crate defines the vocabulary shared by every layer of the workspace:
//! - [`EntityId`], [`Version`], [`Money`]: aggregate identity, versioning and amounts
//! - [`Error`]: the unified error taxonomy
//! - [`Config`], [`BackendKind`], [`IsolationLevel`]: backend selection and policy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{BackendKind, Config, IsolationLevel};
pub use error::{DomainError, Error, Result};
pub use types::{EntityId, Money, Version};
