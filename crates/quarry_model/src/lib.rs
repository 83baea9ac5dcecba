//! The build model seen by the configuration cache.
//!
//! Defines the scheduled work graph, build event subscriptions, the
//! build invocation parameters, and the narrow collaborator interfaces
//! through which the cache engine talks to its host: build creation,
//! value sources, file hashing, and build-properties loading.

#![warn(missing_docs)]

pub mod graph;
pub mod host;
pub mod invocation;
pub mod subscription;
pub mod value_source;

pub use graph::{WorkGraph, WorkNode};
pub use host::{
    BuildHandle, BuildHost, BuildPropertiesLoader, BuildState, FileHasher, HostError, XxFileHasher,
};
pub use invocation::StartParameter;
pub use subscription::EventSubscription;
pub use value_source::{
    encode_property_value, system_property_name, system_property_params, ObtainedValue,
    ValueSource, ValueSourceFactory, ValueSourceObserver, SYSTEM_PROPERTY_SOURCE,
};
