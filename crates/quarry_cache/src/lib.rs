//! Persistence and reuse of a build's prepared execution plan.
//!
//! Before build logic is evaluated, this crate decides whether a
//! previously computed execution plan can be reused verbatim by
//! re-checking the fingerprint of every external input the recorded
//! configuration observed. When reuse is impossible, it collects a new
//! fingerprint during evaluation and persists the computed plan plus
//! everything needed to validate future reuse, never leaving a
//! half-written entry behind.

#![warn(missing_docs)]

pub mod cache;
pub mod entry;
pub mod error;
pub mod fingerprint;
pub mod graph_codec;
pub mod key;

pub use cache::{CachePhase, CheckOutcome, CollectingScope, ConfigurationCache};
pub use error::CacheError;
pub use quarry_config::CacheOptions;
pub use fingerprint::{
    check_fingerprint, CheckedFingerprint, Fingerprint, FingerprintCollector, InputFileRecord,
};
pub use graph_codec::{fill_gaps, UnsupportedPayload, UNSUPPORTED_PAYLOAD_TAG};
pub use key::{cache_key, CacheLocation, CACHE_DIR_NAME};
