//! Error types for codec operations.

/// Errors that can occur while encoding or decoding a cache stream.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred on the underlying stream.
    #[error("codec I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream contents do not match the expected wire format.
    #[error("malformed stream: {reason}")]
    Malformed {
        /// Description of the format violation.
        reason: String,
    },

    /// No payload codec is registered for the given tag in the active
    /// isolate's encoder set.
    #[error("no encoder registered for payload tag {tag:?}")]
    UnknownTag {
        /// The unresolvable payload tag.
        tag: String,
    },

    /// A payload operation was attempted outside any isolate scope.
    #[error("payload encoding attempted outside any isolate scope")]
    NoIsolate,

    /// The serialization procedure violated its protocol, e.g. a stream
    /// ended without its completion marker. This indicates a defect in
    /// an encoder or decoder, not a recoverable cache condition.
    #[error("serialization protocol violation: {reason}")]
    Protocol {
        /// Description of the protocol violation.
        reason: String,
    },
}

impl CodecError {
    /// Creates a malformed-stream error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            reason: reason.into(),
        }
    }

    /// Creates a protocol-violation error.
    pub fn protocol(reason: impl Into<String>) -> Self {
        CodecError::Protocol {
            reason: reason.into(),
        }
    }
}
