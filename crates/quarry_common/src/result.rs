//! Common result and error types for the cache engine.

/// The standard result type for operations that can only fail on an
/// internal invariant violation.
pub type QuarryResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in the cache engine, not a user
/// input problem or an invalid cache entry.
///
/// These errors should never occur during normal operation: a
/// serialization procedure that ends without reaching its completion
/// marker, or a lifecycle operation invoked in the wrong phase, is a
/// logic error to be fixed, not a condition to recover from.
#[derive(Debug, thiserror::Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
