//! MySQL backend for the provider.
//!
//! [`MysqlGateway`] implements the reconciler's backend port over an sqlx
//! pool and adds the administrative operations exposed by the CLI.

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod gateway;
pub mod statements;

pub use error::{MysqlError, Result};
pub use gateway::MysqlGateway;
