//! Conformance test helpers for the configuration cache.
//!
//! Provides an in-memory fake host (build state, build shell, value
//! sources) and sample payload types with codecs, so integration tests
//! can drive the full decide → collect → save → load lifecycle without
//! a real build tool around it.

#![warn(missing_docs)]

use quarry_cache::ConfigurationCache;
use quarry_codec::{
    CodecError, EncoderResolver, EncoderSet, IsolateOwner, PayloadCodec, PayloadValue,
    ReadContext, WriteContext,
};
use quarry_common::ProjectPath;
use quarry_config::CacheOptions;
use quarry_model::{
    BuildHandle, BuildHost, BuildPropertiesLoader, BuildState, EventSubscription, FileHasher,
    HostError, ObtainedValue, StartParameter, ValueSource, ValueSourceFactory,
    ValueSourceObserver, WorkGraph, WorkNode, XxFileHasher,
};
use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Wire tag of [`TaskAction`].
pub const TASK_ACTION_TAG: &str = "quarry.task";

/// Wire tag of [`ListenerProvider`].
pub const LISTENER_PROVIDER_TAG: &str = "quarry.listener";

/// A minimal task-like work payload.
#[derive(Debug, PartialEq, Eq)]
pub struct TaskAction {
    /// The task name, unique within its project.
    pub name: String,
}

impl TaskAction {
    /// Creates a boxed task action payload.
    pub fn boxed(name: impl Into<String>) -> Box<dyn PayloadValue> {
        Box::new(TaskAction { name: name.into() })
    }
}

impl PayloadValue for TaskAction {
    fn type_tag(&self) -> &str {
        TASK_ACTION_TAG
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Codec for [`TaskAction`].
pub struct TaskActionCodec;

impl PayloadCodec for TaskActionCodec {
    fn encode(
        &self,
        value: &dyn PayloadValue,
        ctx: &mut WriteContext<'_>,
    ) -> Result<(), CodecError> {
        let task = value
            .as_any()
            .downcast_ref::<TaskAction>()
            .ok_or_else(|| CodecError::malformed("expected a TaskAction"))?;
        ctx.write_string(&task.name)
    }

    fn decode(&self, ctx: &mut ReadContext<'_>) -> Result<Box<dyn PayloadValue>, CodecError> {
        Ok(TaskAction::boxed(ctx.read_string()?))
    }
}

/// A minimal build-event listener provider payload.
#[derive(Debug, PartialEq, Eq)]
pub struct ListenerProvider {
    /// Identifies the listener to re-attach on load.
    pub id: String,
}

impl ListenerProvider {
    /// Creates a boxed listener provider payload.
    pub fn boxed(id: impl Into<String>) -> Box<dyn PayloadValue> {
        Box::new(ListenerProvider { id: id.into() })
    }
}

impl PayloadValue for ListenerProvider {
    fn type_tag(&self) -> &str {
        LISTENER_PROVIDER_TAG
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Codec for [`ListenerProvider`].
pub struct ListenerProviderCodec;

impl PayloadCodec for ListenerProviderCodec {
    fn encode(
        &self,
        value: &dyn PayloadValue,
        ctx: &mut WriteContext<'_>,
    ) -> Result<(), CodecError> {
        let provider = value
            .as_any()
            .downcast_ref::<ListenerProvider>()
            .ok_or_else(|| CodecError::malformed("expected a ListenerProvider"))?;
        ctx.write_string(&provider.id)
    }

    fn decode(&self, ctx: &mut ReadContext<'_>) -> Result<Box<dyn PayloadValue>, CodecError> {
        Ok(ListenerProvider::boxed(ctx.read_string()?))
    }
}

/// A codec that fails on encode, for save-failure tests.
pub struct FailingCodec;

impl PayloadCodec for FailingCodec {
    fn encode(
        &self,
        _value: &dyn PayloadValue,
        _ctx: &mut WriteContext<'_>,
    ) -> Result<(), CodecError> {
        Err(CodecError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "encoder fault",
        )))
    }

    fn decode(&self, _ctx: &mut ReadContext<'_>) -> Result<Box<dyn PayloadValue>, CodecError> {
        Err(CodecError::malformed("FailingCodec cannot decode"))
    }
}

/// Resolver returning fixed encoder sets per scope.
pub struct ScopedResolver {
    host: Arc<EncoderSet>,
    build: Arc<EncoderSet>,
    project: Arc<EncoderSet>,
}

impl ScopedResolver {
    /// Creates a resolver with explicit per-scope sets.
    pub fn new(host: EncoderSet, build: EncoderSet, project: EncoderSet) -> Self {
        Self {
            host: Arc::new(host),
            build: Arc::new(build),
            project: Arc::new(project),
        }
    }

    /// The standard conformance resolver: task and listener codecs in
    /// the build and project scopes, an empty host scope.
    pub fn standard() -> Self {
        let task_codec: Arc<dyn PayloadCodec> = Arc::new(TaskActionCodec);
        let listener_codec: Arc<dyn PayloadCodec> = Arc::new(ListenerProviderCodec);
        Self::new(
            EncoderSet::new(),
            EncoderSet::new()
                .with_codec(TASK_ACTION_TAG, Arc::clone(&task_codec))
                .with_codec(LISTENER_PROVIDER_TAG, Arc::clone(&listener_codec)),
            EncoderSet::new()
                .with_codec(TASK_ACTION_TAG, task_codec)
                .with_codec(LISTENER_PROVIDER_TAG, listener_codec),
        )
    }
}

impl EncoderResolver for ScopedResolver {
    fn encoder_set_for(&self, owner: &IsolateOwner) -> Arc<EncoderSet> {
        match owner {
            IsolateOwner::Host => Arc::clone(&self.host),
            IsolateOwner::Build => Arc::clone(&self.build),
            IsolateOwner::Project(_) => Arc::clone(&self.project),
        }
    }
}

/// What the fake host materialized from a cache entry.
#[derive(Default)]
pub struct MaterializedBuild {
    /// Root project name the shell was created with.
    pub root_project_name: String,
    /// Projects registered, in registration order.
    pub projects: Vec<ProjectPath>,
    /// Re-attached event subscriptions.
    pub subscriptions: Vec<EventSubscription>,
    /// The scheduled work graph, once handed over.
    pub scheduled: Option<WorkGraph>,
}

/// The build the fake host is currently configuring.
pub struct TestBuildState {
    /// Root project name.
    pub root_project_name: String,
    /// Whether this is the bootstrap sub-build.
    pub bootstrap: bool,
    /// The computed work graph (the "evaluation result").
    pub work: WorkGraph,
    /// Build-scoped event subscriptions.
    pub subscriptions: Vec<EventSubscription>,
}

impl BuildState for TestBuildState {
    fn root_project_name(&self) -> &str {
        &self.root_project_name
    }
    fn is_bootstrap(&self) -> bool {
        self.bootstrap
    }
    fn scheduled_work(&self) -> &WorkGraph {
        &self.work
    }
    fn event_subscriptions(&self) -> &[EventSubscription] {
        &self.subscriptions
    }
}

/// An in-memory host for lifecycle tests.
pub struct TestHost {
    state: TestBuildState,
    resolver: Arc<dyn EncoderResolver>,
    /// Inspectable result of the last [`BuildHost::create_build`].
    pub materialized: Arc<Mutex<MaterializedBuild>>,
}

impl TestHost {
    /// Creates a host around the given build state and resolver.
    pub fn new(state: TestBuildState, resolver: Arc<dyn EncoderResolver>) -> Self {
        Self {
            state,
            resolver,
            materialized: Arc::new(Mutex::new(MaterializedBuild::default())),
        }
    }
}

impl BuildHost for TestHost {
    fn current_build(&self) -> &dyn BuildState {
        &self.state
    }

    fn create_build(&self, root_project_name: &str) -> Result<Box<dyn BuildHandle>, HostError> {
        {
            let mut materialized = self.materialized.lock().unwrap();
            *materialized = MaterializedBuild {
                root_project_name: root_project_name.to_string(),
                ..MaterializedBuild::default()
            };
        }
        Ok(Box::new(TestBuildHandle {
            shared: Arc::clone(&self.materialized),
        }))
    }

    fn encoders(&self) -> Arc<dyn EncoderResolver> {
        Arc::clone(&self.resolver)
    }
}

struct TestBuildHandle {
    shared: Arc<Mutex<MaterializedBuild>>,
}

impl BuildHandle for TestBuildHandle {
    fn register_project(&mut self, path: &ProjectPath) -> Result<(), HostError> {
        let mut build = self.shared.lock().unwrap();
        if let Some(parent) = path.parent() {
            if !build.projects.contains(&parent) {
                return Err(format!(
                    "project '{path}' registered before its parent '{parent}'"
                )
                .into());
            }
        }
        build.projects.push(path.clone());
        Ok(())
    }

    fn attach_subscriptions(
        &mut self,
        subscriptions: Vec<EventSubscription>,
    ) -> Result<(), HostError> {
        self.shared.lock().unwrap().subscriptions = subscriptions;
        Ok(())
    }

    fn schedule(&mut self, graph: WorkGraph) -> Result<(), HostError> {
        self.shared.lock().unwrap().scheduled = Some(graph);
        Ok(())
    }
}

/// An in-memory value-source factory with observable attachment state.
#[derive(Default)]
pub struct TestValueSourceFactory {
    observers: Mutex<Vec<Arc<dyn ValueSourceObserver>>>,
    values: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl TestValueSourceFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current value produced by a source type.
    pub fn set_value(&self, source_type: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.values
            .lock()
            .unwrap()
            .insert(source_type.into(), value.into());
    }

    /// Number of currently attached observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    /// Simulates build logic obtaining a value: instantiates the source,
    /// obtains the value, and notifies every attached observer.
    pub fn obtain(
        &self,
        source_type: &str,
        params_type: &str,
        params: &[u8],
    ) -> Result<Vec<u8>, HostError> {
        let source = self.instantiate(source_type, params_type, params)?;
        let value = source.obtain()?;
        let obtained = ObtainedValue {
            source_type: source_type.to_string(),
            params_type: params_type.to_string(),
            params: params.to_vec(),
            value: value.clone(),
        };
        for observer in self.observers.lock().unwrap().iter() {
            observer.value_obtained(&obtained);
        }
        Ok(value)
    }

    /// Simulates build logic reading a configuration file, notifying
    /// every attached observer.
    pub fn observe_file(&self, path: &Path) {
        for observer in self.observers.lock().unwrap().iter() {
            observer.file_observed(path);
        }
    }
}

struct StoredSource(Option<Vec<u8>>);

impl ValueSource for StoredSource {
    fn obtain(&self) -> Result<Vec<u8>, HostError> {
        self.0
            .clone()
            .ok_or_else(|| "value source has no value".into())
    }
}

impl ValueSourceFactory for TestValueSourceFactory {
    fn add_observer(&self, observer: Arc<dyn ValueSourceObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    fn remove_observer(&self, observer: &Arc<dyn ValueSourceObserver>) {
        self.observers
            .lock()
            .unwrap()
            .retain(|o| !Arc::ptr_eq(o, observer));
    }

    fn instantiate(
        &self,
        source_type: &str,
        _params_type: &str,
        _params: &[u8],
    ) -> Result<Box<dyn ValueSource>, HostError> {
        Ok(Box::new(StoredSource(
            self.values.lock().unwrap().get(source_type).cloned(),
        )))
    }
}

/// Properties loader recording the directories it was asked to load.
#[derive(Default)]
pub struct RecordingPropertiesLoader {
    /// Root directories passed to `load_properties_from`, in order.
    pub loaded: Mutex<Vec<PathBuf>>,
}

impl BuildPropertiesLoader for RecordingPropertiesLoader {
    fn load_properties_from(&self, root_dir: &Path) -> Result<(), HostError> {
        self.loaded.lock().unwrap().push(root_dir.to_path_buf());
        Ok(())
    }
}

/// Everything a lifecycle test needs wired together.
pub struct TestFixture {
    /// The host handed to the cache.
    pub host: Arc<TestHost>,
    /// The value-source factory handed to the cache.
    pub factory: Arc<TestValueSourceFactory>,
    /// The properties loader handed to the cache.
    pub properties: Arc<RecordingPropertiesLoader>,
}

impl TestFixture {
    /// Builds a cache over this fixture for the given invocation.
    pub fn cache(&self, options: CacheOptions, start: StartParameter) -> ConfigurationCache {
        let host: Arc<dyn BuildHost> = self.host.clone();
        let factory: Arc<dyn ValueSourceFactory> = self.factory.clone();
        let hasher: Arc<dyn FileHasher> = Arc::new(XxFileHasher);
        let properties: Arc<dyn BuildPropertiesLoader> = self.properties.clone();
        ConfigurationCache::new(options, start, "1.4.0", host, factory, hasher, properties)
    }
}

/// Creates a fixture around the given build state with the standard
/// resolver.
pub fn fixture(state: TestBuildState) -> TestFixture {
    fixture_with_resolver(state, Arc::new(ScopedResolver::standard()))
}

/// Creates a fixture around the given build state and resolver.
pub fn fixture_with_resolver(
    state: TestBuildState,
    resolver: Arc<dyn EncoderResolver>,
) -> TestFixture {
    TestFixture {
        host: Arc::new(TestHost::new(state, resolver)),
        factory: Arc::new(TestValueSourceFactory::new()),
        properties: Arc::new(RecordingPropertiesLoader::default()),
    }
}

/// Enabled, non-quiet options for tests.
pub fn enabled_options() -> CacheOptions {
    CacheOptions {
        enabled: true,
        quiet: true,
        ..CacheOptions::default()
    }
}

/// A small two-project work graph: `:app:compile <- :app:jar`, plus a
/// project-less lifecycle node, with subscriptions on the build.
pub fn sample_state(root_project_name: &str) -> TestBuildState {
    let mut work = WorkGraph::new();
    let app: ProjectPath = ":app".parse().unwrap();
    let compile = work.add_node(WorkNode::new(TaskAction::boxed("compile"), Some(app.clone())));
    let jar = work.add_node(WorkNode::new(TaskAction::boxed("jar"), Some(app)));
    let clean = work.add_node(WorkNode::new(TaskAction::boxed("clean"), None));
    work.add_dependency(jar, compile);
    work.add_dependency(jar, clean);

    TestBuildState {
        root_project_name: root_project_name.to_string(),
        bootstrap: false,
        work,
        subscriptions: vec![EventSubscription::new(ListenerProvider::boxed("events"))],
    }
}
