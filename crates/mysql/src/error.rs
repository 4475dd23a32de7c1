//! MySQL gateway errors.

use thiserror::Error;

/// Errors raised while talking to the MySQL server.
#[derive(Debug, Error)]
pub enum MysqlError {
    /// A name cannot be safely interpolated into a statement
    #[error("invalid {kind} name '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: String,
    },

    /// The user already exists
    #[error("user '{username}' already exists")]
    UserExists { username: String },

    /// The user does not exist
    #[error("user '{username}' does not exist")]
    UserNotFound { username: String },

    /// The database already exists
    #[error("database '{database}' already exists")]
    DatabaseExists { database: String },

    /// The server could not be reached
    #[error("mysql is not ready: {reason}")]
    NotReady { reason: String },

    /// A statement failed
    #[error("{operation} failed: {reason}")]
    Query { operation: String, reason: String },
}

impl MysqlError {
    pub fn invalid_identifier(
        kind: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidIdentifier {
            kind,
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn query(operation: impl Into<String>, err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::NotReady {
                    reason: err.to_string(),
                }
            }
            _ => Self::Query {
                operation: operation.into(),
                reason: err.to_string(),
            },
        }
    }

    /// Check if the error is a connectivity problem.
    #[must_use]
    pub const fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }
}

/// Result type for MySQL operations.
pub type Result<T> = std::result::Result<T, MysqlError>;

impl From<MysqlError> for provider_reconciler::Error {
    fn from(err: MysqlError) -> Self {
        match err {
            MysqlError::NotReady { .. } => Self::NotReady,
            MysqlError::Query { operation, reason } => Self::backend_failed(operation, reason),
            other => Self::backend_failed("validate", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_not_ready() {
        let err = MysqlError::query("grant", &sqlx::Error::PoolTimedOut);
        assert!(err.is_not_ready());
        let mapped: provider_reconciler::Error = err.into();
        assert!(matches!(mapped, provider_reconciler::Error::NotReady));
    }

    #[test]
    fn test_query_error_maps_to_backend_failure() {
        let err = MysqlError::query("grant", &sqlx::Error::RowNotFound);
        assert!(!err.is_not_ready());
        let mapped: provider_reconciler::Error = err.into();
        assert!(matches!(
            mapped,
            provider_reconciler::Error::BackendOperationFailed { ref operation, .. } if operation == "grant"
        ));
    }

    #[test]
    fn test_invalid_identifier_display() {
        let err = MysqlError::invalid_identifier("database", "a b", "contains ' '");
        assert_eq!(err.to_string(), "invalid database name 'a b': contains ' '");
    }
}
