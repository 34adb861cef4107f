//! Error types for the cache layer.

use std::fmt;

/// Result type for cache-internal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised inside the cache layer.
///
/// Factory failures never show up here: `get_or_create` hands the caller's
/// own error type back untouched.
#[derive(Debug, Clone)]
pub enum Error {
    /// A descriptor could not be evaluated.
    ///
    /// Only seen by code that calls the evaluator's fallible internals or
    /// by an opaque invokable reporting failure. The public evaluator turns
    /// this into a textual fallback value.
    EvaluationError(String),

    /// Configuration error while building the cache.
    ///
    /// Common causes:
    /// - zero default expiration or zero default item size
    /// - unparsable environment override
    ///
    /// **Recovery:** Fix configuration and restart.
    ConfigError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EvaluationError(msg) => write!(f, "Evaluation error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
