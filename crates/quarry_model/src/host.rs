//! Collaborator interfaces between the cache engine and its host.

use crate::graph::WorkGraph;
use crate::subscription::EventSubscription;
use quarry_codec::EncoderResolver;
use quarry_common::{ContentHash, ProjectPath};
use std::path::Path;
use std::sync::Arc;

/// Errors surfaced by host collaborators.
pub type HostError = Box<dyn std::error::Error + Send + Sync>;

/// Read access to the build currently being configured.
pub trait BuildState {
    /// The root project's name.
    fn root_project_name(&self) -> &str;

    /// Whether this build is the bootstrap sub-build that compiles the
    /// build logic itself (excluded from caching by policy).
    fn is_bootstrap(&self) -> bool;

    /// The scheduled work graph, available after evaluation.
    fn scheduled_work(&self) -> &WorkGraph;

    /// Build-scoped event-listener subscriptions.
    fn event_subscriptions(&self) -> &[EventSubscription];
}

/// The host process driving the build.
pub trait BuildHost: Send + Sync {
    /// The build currently being configured or loaded.
    fn current_build(&self) -> &dyn BuildState;

    /// Materializes an empty build shell with the given root project
    /// name, ready to have projects registered into it.
    fn create_build(&self, root_project_name: &str) -> Result<Box<dyn BuildHandle>, HostError>;

    /// Per-scope payload-encoder resolution.
    fn encoders(&self) -> Arc<dyn EncoderResolver>;
}

/// A build shell being materialized from a cache entry.
pub trait BuildHandle {
    /// Registers one project. Projects arrive parent-before-child, so
    /// an implementation may assume the parent already exists.
    fn register_project(&mut self, path: &ProjectPath) -> Result<(), HostError>;

    /// Attaches the deserialized build-scoped event subscriptions.
    fn attach_subscriptions(
        &mut self,
        subscriptions: Vec<EventSubscription>,
    ) -> Result<(), HostError>;

    /// Hands the materialized work graph to the host for scheduling.
    fn schedule(&mut self, graph: WorkGraph) -> Result<(), HostError>;
}

/// The external content-hash service.
pub trait FileHasher: Send + Sync {
    /// Computes the current content hash of the file at `path`.
    fn hash_of(&self, path: &Path) -> Result<ContentHash, HostError>;
}

/// Default file hasher reading the file and hashing with XXH3-128.
#[derive(Debug, Default)]
pub struct XxFileHasher;

impl FileHasher for XxFileHasher {
    fn hash_of(&self, path: &Path) -> Result<ContentHash, HostError> {
        let content = std::fs::read(path)?;
        Ok(ContentHash::from_bytes(&content))
    }
}

/// Loads externally-sourced build properties for a root directory into
/// the host's property machinery.
///
/// Invoked once before fingerprint checking, so value sources that read
/// properties resolve against the same values the recorded build saw.
pub trait BuildPropertiesLoader: Send + Sync {
    /// Loads properties for the given (as yet unconfigured) root
    /// directory.
    fn load_properties_from(&self, root_dir: &Path) -> Result<(), HostError>;
}
