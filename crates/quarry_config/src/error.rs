//! Error types for configuration loading.

use std::path::PathBuf;

/// Errors that can occur while loading build configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading a configuration file.
    #[error("config I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {reason}")]
    Parse {
        /// Description of the parse failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = ConfigError::Io {
            path: PathBuf::from("/demo/quarry.toml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("quarry.toml"));

        let err = ConfigError::Parse {
            reason: "unexpected token".to_string(),
        };
        assert!(err.to_string().contains("unexpected token"));
    }
}
