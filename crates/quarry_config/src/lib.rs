//! Configuration surface of the cache engine.
//!
//! Resolves the environment-level cache flags (enable, quiet logging,
//! problem limits) from command-line overrides with process-wide
//! property fallback, and loads build properties from the project's
//! `quarry.toml`.

#![warn(missing_docs)]

pub mod error;
pub mod options;
pub mod properties;

pub use error::ConfigError;
pub use options::{
    CacheOptions, DEFAULT_MAX_PROBLEMS, ENABLED_PROPERTY, FAIL_ON_PROBLEMS_PROPERTY,
    MAX_PROBLEMS_PROPERTY, QUIET_PROPERTY,
};
pub use properties::{
    load_build_properties, load_build_properties_from_str, BuildProperties, TomlPropertiesLoader,
};
