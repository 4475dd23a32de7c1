//! Relation-driven reconciliation of MySQL databases and credentials.
//!
//! Consumers ask for databases over a relation. This crate turns each
//! relation event into backend state:
//!
//! - **Reconcile** (joined / changed): create the missing databases, issue
//!   the relation's login, grant it every requested database, then publish
//!   the confirmed list and credentials back to the consumer
//! - **Teardown** (broken): revoke the login, forget the credential, and
//!   with `autodelete` drop the confirmed databases
//!
//! Only the leader unit acts. An unready backend gets one grace period
//! before the event is deferred.
//!
//! # Key Concepts
//!
//! - [`BackendGateway`]: port to the database server
//! - [`CredentialStore`]: durable relation to credential mapping
//! - [`Reconciler`]: one pass for one event
//! - [`Controller`]: the serial event loop around the reconciler
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use provider_reconciler::{
//!     Controller, ControllerConfig, InMemoryGateway, ReconcilerBuilder,
//! };
//! use provider_relation::InMemoryTransport;
//!
//! #[tokio::main]
//! async fn main() {
//!     let Ok(reconciler) = ReconcilerBuilder::new()
//!         .with_gateway(Arc::new(InMemoryGateway::new()))
//!         .build()
//!     else {
//!         return;
//!     };
//!     let reconciler = Arc::new(reconciler);
//!     let transport = Arc::new(InMemoryTransport::new("10.0.0.4", true));
//!     let mut controller = Controller::new(reconciler, transport, ControllerConfig::default());
//!
//!     // Run until stopped
//!     // controller.run().await;
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod controller;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod readiness;
pub mod reconciler;
pub mod status;
pub mod types;

// Re-export main types
pub use controller::{Controller, ControllerConfig, ControllerStopper};
pub use credentials::{
    Credential, CredentialStore, DEFAULT_PASSWORD_LENGTH, InMemoryCredentialStore,
    generate_password, username_for,
};
pub use error::{Error, Result};
pub use gateway::BackendGateway;
pub use memory::{GatewayCall, InMemoryGateway};
pub use readiness::{Gate, ReadinessGate};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use status::UnitStatus;
pub use types::{PassOutcome, PassReport, ProviderData, ProvisionPlan, ReconcileAction};
