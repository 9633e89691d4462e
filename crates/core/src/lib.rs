//! Shared ids and domain errors.
//!
//! This crate contains **pure** primitives (no infrastructure concerns) used by
//! the catalog model, the migration engine and the adapters around it.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{RemoteId, SessionId};
