//! Error types for the reconciler crate.

use std::fmt;

use provider_relation::RelationId;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The backend is not reachable yet.
    NotReady,
    /// Previously published provider data is missing or unreadable.
    InconsistentState { relation: RelationId, reason: String },
    /// A backend operation failed.
    BackendOperationFailed { operation: String, reason: String },
    /// The credential store failed.
    CredentialStore { reason: String },
    /// The relation transport failed.
    Transport { reason: String },
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "backend not ready"),
            Self::InconsistentState { relation, reason } => {
                write!(f, "inconsistent state for relation {relation}: {reason}")
            }
            Self::BackendOperationFailed { operation, reason } => {
                write!(f, "backend operation '{operation}' failed: {reason}")
            }
            Self::CredentialStore { reason } => {
                write!(f, "credential store error: {reason}")
            }
            Self::Transport { reason } => {
                write!(f, "transport error: {reason}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Create an inconsistent state error.
    pub fn inconsistent_state(relation: RelationId, reason: impl Into<String>) -> Self {
        Self::InconsistentState {
            relation,
            reason: reason.into(),
        }
    }

    /// Create a backend operation failed error.
    pub fn backend_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendOperationFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a credential store error.
    pub fn credential_store(reason: impl Into<String>) -> Self {
        Self::CredentialStore {
            reason: reason.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether handling the same event again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotReady
                | Self::BackendOperationFailed { .. }
                | Self::CredentialStore { .. }
                | Self::Transport { .. }
        )
    }
}

impl From<provider_relation::Error> for Error {
    fn from(err: provider_relation::Error) -> Self {
        match err {
            provider_relation::Error::RelationNotFound { relation } => {
                Self::inconsistent_state(relation, "relation is gone")
            }
            other => Self::transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::inconsistent_state(RelationId::new(4), "no confirmed databases");
        assert_eq!(
            err.to_string(),
            "inconsistent state for relation 4: no confirmed databases"
        );
    }

    #[test]
    fn test_backend_failed() {
        let err = Error::backend_failed("grant", "access denied");
        assert!(err.to_string().contains("grant"));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::NotReady.is_retryable());
        assert!(Error::backend_failed("drop_user", "timeout").is_retryable());
        assert!(Error::credential_store("locked").is_retryable());
        assert!(!Error::inconsistent_state(RelationId::new(1), "x").is_retryable());
        assert!(!Error::invalid_config("x").is_retryable());
    }

    #[test]
    fn test_vanished_relation_is_not_retryable() {
        let err = Error::from(provider_relation::Error::relation_not_found(RelationId::new(3)));
        assert!(matches!(err, Error::InconsistentState { .. }));
        assert!(!err.is_retryable());

        let err = Error::from(provider_relation::Error::ChannelClosed);
        assert!(err.is_retryable());
    }
}
