//! Result type definition and extension traits for Railway-Oriented Programming.
//!
//! Provides functional combinators for Result types, enabling clean error handling
//! without unwrap/expect/panic.

use crate::error::Error;

/// The standard Result type for core provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Generic extension trait for any Result type.
///
/// Provides tap-style combinators for side effects such as logging a failure
/// before it is propagated with `?`.
pub trait GenericResultExt<T, E> {
    /// Perform a side effect on Ok value without consuming the Result.
    fn tap_ok<F: FnOnce(&T)>(self, f: F) -> Self;

    /// Perform a side effect on Err value without consuming the Result.
    fn tap_err<F: FnOnce(&E)>(self, f: F) -> Self;

    /// Convert to an Option, logging the error at `warn` level if present.
    fn ok_logged(self, context: &str) -> Option<T>
    where
        E: std::fmt::Display;
}

impl<T, E> GenericResultExt<T, E> for std::result::Result<T, E> {
    fn tap_ok<F: FnOnce(&T)>(self, f: F) -> Self {
        if let Ok(ref v) = self {
            f(v);
        }
        self
    }

    fn tap_err<F: FnOnce(&E)>(self, f: F) -> Self {
        if let Err(ref e) = self {
            f(e);
        }
        self
    }

    fn ok_logged(self, context: &str) -> Option<T>
    where
        E: std::fmt::Display,
    {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "{context}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_ok() {
        let mut observed = 0;
        let result: std::result::Result<i32, &str> = Ok(42);
        let _ = result.tap_ok(|v| observed = *v);
        assert_eq!(observed, 42);
    }

    #[test]
    fn test_tap_err() {
        let mut observed = String::new();
        let result: std::result::Result<i32, &str> = Err("error");
        let _ = result.tap_err(|e| observed = (*e).to_string());
        assert_eq!(observed, "error");
    }

    #[test]
    fn test_tap_err_passes_result_through() {
        let result: std::result::Result<i32, &str> = Err("boom");
        assert_eq!(result.tap_err(|_| {}), Err("boom"));
    }

    #[test]
    fn test_ok_logged() {
        let ok: std::result::Result<i32, &str> = Ok(7);
        assert_eq!(ok.ok_logged("unused"), Some(7));

        let err: std::result::Result<i32, &str> = Err("gone");
        assert_eq!(err.ok_logged("lookup failed"), None);
    }
}
