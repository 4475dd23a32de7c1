//! Relation plumbing between this provider and its consumers.
//!
//! This crate models the consumer/provider relation channel. Key features:
//!
//! - **Identifiers and data bags**: [`RelationId`] and the per-side
//!   key-value [`DataBag`] with JSON helpers for the wire keys
//! - **Events**: joined / changed / broken notifications ([`RelationEvent`])
//! - **Lifecycle**: per-relation state machine routing events to handlers
//! - **Transport**: the [`RelationTransport`] port and an in-memory
//!   implementation with defer/redelivery and publication broadcast
//!
//! # Example
//!
//! ```ignore
//! use provider_relation::{DataBag, InMemoryTransport, RelationId, RelationTransport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = InMemoryTransport::new("10.0.0.4", true);
//!     let mut bag = DataBag::new();
//!     bag.insert("databases", r#"["app1"]"#);
//!     transport.join(RelationId::new(3), Some("wordpress"), bag).await.ok();
//!
//!     let event = transport.next_event().await;
//!     println!("Received: {event:?}");
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod event;
pub mod lifecycle;
pub mod transport;
pub mod types;

// Re-export main types
pub use error::{Error, Result};
pub use event::{Delivery, RelationEvent, RelationEventKind};
pub use lifecycle::{RelationLifecycle, RelationPhase, Route};
pub use transport::{InMemoryTransport, Publication, RelationTransport};
pub use types::{DATA_KEY, DATABASES_KEY, DataBag, EventId, RelationId};
