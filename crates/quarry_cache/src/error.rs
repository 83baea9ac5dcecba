//! Error types for cache operations.

use quarry_codec::CodecError;
use quarry_common::InternalError;
use quarry_problems::ReportError;
use std::path::PathBuf;

/// Errors that can occur while saving or loading a cache entry.
///
/// Reuse decisions are fail-safe and never surface through this type:
/// a missing or stale entry is a cache miss, not an error. Errors here
/// mean a save or load could not complete.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A codec-level fault while encoding or decoding the entry.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A serialization or deserialization error outside the codec
    /// stream itself (headers, unreadable state).
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },

    /// A host collaborator failed.
    #[error("host collaborator error: {reason}")]
    Host {
        /// Description of the collaborator failure.
        reason: String,
    },

    /// More serialization problems were recorded than the configured
    /// maximum tolerates.
    #[error("{count} configuration cache problems were found, exceeding the maximum of {max}")]
    TooManyProblems {
        /// Total number of problems recorded.
        count: usize,
        /// The configured maximum.
        max: usize,
    },

    /// Problems were recorded and the fail-on-problems switch is set.
    #[error("{count} configuration cache problems were found")]
    ProblemsFound {
        /// Total number of problems recorded.
        count: usize,
    },

    /// The problem report could not be written.
    #[error(transparent)]
    Report(#[from] ReportError),

    /// An internal invariant was violated (wrong lifecycle phase, or a
    /// serialization procedure that did not run to completion).
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl CacheError {
    /// Wraps a host collaborator error.
    pub fn host(source: quarry_model::HostError) -> Self {
        CacheError::Host {
            reason: source.to_string(),
        }
    }
}
