//! Durable credential storage for the MySQL provider.
//!
//! Credentials outlive the process: a relation's login must be the same
//! after a restart so the consumer's published secret stays valid.

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod client;
pub mod credential_store;
pub mod error;

pub use client::{CredentialDb, StoreConfig};
pub use credential_store::SurrealCredentialStore;
pub use error::{PersistenceError, PersistenceResult, from_surrealdb_error};
