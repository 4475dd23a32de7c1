#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # mysql-provider
//!
//! Provisions MySQL databases and credentials for applications related to
//! this unit.
//!
//! This library holds the CLI and the stdio wiring around the workspace
//! crates; the binary is a thin `main`.

pub mod cli;
pub mod commands;
pub mod serve;

pub use provider_core;
pub use provider_reconciler;
pub use provider_relation;
