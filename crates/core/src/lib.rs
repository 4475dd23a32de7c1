//! Core types shared by every provider crate.
//!
//! - [`Error`] / [`Result`]: configuration and I/O failures
//! - [`GenericResultExt`]: tap-style combinators used to log failures inline
//! - [`ProviderConfig`]: the process-wide configuration surface

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod result;

pub use config::{
    MysqlConfig, ProviderConfig, ReadinessConfig, RedeliveryConfig, StoreSettings, UnitConfig,
};
pub use error::Error;
pub use result::{GenericResultExt, Result};
