//! Error types for the relation crate.

use thiserror::Error;

use crate::types::RelationId;

/// Result type alias for relation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Relation error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// No relation with this identifier is known to the transport.
    #[error("relation {relation} not found")]
    RelationNotFound { relation: RelationId },

    /// A data bag value could not be encoded or decoded.
    #[error("serialization error for key '{key}': {reason}")]
    Serialization { key: String, reason: String },

    /// The transport no longer accepts or delivers events.
    #[error("relation event channel closed")]
    ChannelClosed,
}

impl Error {
    /// Create a relation not found error.
    pub const fn relation_not_found(relation: RelationId) -> Self {
        Self::RelationNotFound { relation }
    }

    /// Create a serialization error.
    pub fn serialization(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Serialization {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
