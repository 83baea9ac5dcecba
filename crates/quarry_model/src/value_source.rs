//! Value sources: build-logic queries of external values.
//!
//! A value source is the generic abstraction through which build logic
//! reads something outside the build (a system property, a command
//! output, a file's presence). The cache engine records every obtained
//! value during configuration and re-obtains it during fingerprint
//! checking to detect drift.

use crate::host::HostError;
use std::path::Path;
use std::sync::Arc;

/// The distinguished value-source type for system property reads.
///
/// Fingerprint checking treats this type specially: the current value is
/// fetched directly from the process environment rather than through the
/// generic machinery, because the check runs before command-line-supplied
/// properties have been propagated into it.
pub const SYSTEM_PROPERTY_SOURCE: &str = "quarry.sysProperty";

/// One recorded external input obtained through a value source.
///
/// The parameters and value are opaque encoded payloads; drift detection
/// compares encoded bytes for equality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObtainedValue {
    /// Identifier of the value-source type.
    pub source_type: String,
    /// Identifier of the value-source parameters type.
    pub params_type: String,
    /// The encoded parameters the source was instantiated with.
    pub params: Vec<u8>,
    /// The encoded value observed at configuration time.
    pub value: Vec<u8>,
}

/// An instantiated value source that can produce its current value.
pub trait ValueSource {
    /// Obtains the source's current value in encoded form.
    fn obtain(&self) -> Result<Vec<u8>, HostError>;
}

/// Observer notified on every value-source evaluation and configuration
/// file read during the configuration phase.
pub trait ValueSourceObserver: Send + Sync {
    /// Called once per value-source invocation.
    fn value_obtained(&self, value: &ObtainedValue);

    /// Called when build logic reads a configuration file.
    fn file_observed(&self, path: &Path);
}

/// Host factory for value sources.
pub trait ValueSourceFactory: Send + Sync {
    /// Attaches an observer to all subsequent evaluations.
    fn add_observer(&self, observer: Arc<dyn ValueSourceObserver>);

    /// Detaches a previously attached observer (by identity).
    fn remove_observer(&self, observer: &Arc<dyn ValueSourceObserver>);

    /// Instantiates a value source from its type identifiers and
    /// encoded parameters.
    fn instantiate(
        &self,
        source_type: &str,
        params_type: &str,
        params: &[u8],
    ) -> Result<Box<dyn ValueSource>, HostError>;
}

/// Encodes a possibly-absent property value in the canonical form shared
/// by the recording and checking sides: a presence byte followed by the
/// UTF-8 bytes when present.
pub fn encode_property_value(value: Option<&str>) -> Vec<u8> {
    match value {
        Some(v) => {
            let mut bytes = Vec::with_capacity(1 + v.len());
            bytes.push(1);
            bytes.extend_from_slice(v.as_bytes());
            bytes
        }
        None => vec![0],
    }
}

/// Encodes a system property name as value-source parameters.
pub fn system_property_params(name: &str) -> Vec<u8> {
    name.as_bytes().to_vec()
}

/// Decodes a system property name from value-source parameters.
pub fn system_property_name(params: &[u8]) -> Option<String> {
    String::from_utf8(params.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_value_encoding_distinguishes_absent_from_empty() {
        assert_eq!(encode_property_value(None), vec![0]);
        assert_eq!(encode_property_value(Some("")), vec![1]);
        assert_ne!(encode_property_value(None), encode_property_value(Some("")));
    }

    #[test]
    fn property_value_encoding_is_deterministic() {
        assert_eq!(
            encode_property_value(Some("ci")),
            encode_property_value(Some("ci"))
        );
        assert_ne!(
            encode_property_value(Some("ci")),
            encode_property_value(Some("local"))
        );
    }

    #[test]
    fn system_property_params_roundtrip() {
        let params = system_property_params("org.quarry.daemon");
        assert_eq!(
            system_property_name(&params).as_deref(),
            Some("org.quarry.daemon")
        );
    }

    #[test]
    fn invalid_utf8_params_have_no_name() {
        assert!(system_property_name(&[0xFF, 0xFE]).is_none());
    }
}
