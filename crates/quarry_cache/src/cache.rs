//! The cache lifecycle orchestrator.
//!
//! Sequences the reuse decision, fingerprint collection, save, and load
//! of one build invocation's cache entry, and guarantees the on-disk
//! entry is never left in a half-written state: a failed save deletes
//! the state file before the error propagates.

use crate::entry;
use crate::error::CacheError;
use crate::fingerprint::{
    check_fingerprint, write_fingerprint_file, CheckedFingerprint, FingerprintCollector,
};
use crate::graph_codec;
use crate::key::{cache_key, CacheLocation};
use quarry_codec::{IsolateOwner, ReadContext};
use quarry_common::InternalError;
use quarry_config::CacheOptions;
use quarry_model::{
    BuildHandle, BuildHost, BuildPropertiesLoader, EventSubscription, FileHasher, StartParameter,
    ValueSourceFactory, ValueSourceObserver,
};
use quarry_problems::{ProblemReport, ProblemSink};
use std::sync::Arc;

/// The lifecycle phase the cache is currently in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePhase {
    /// Caching is off for this build; nothing is collected or persisted.
    Disabled,
    /// Deciding whether the existing entry can be reused.
    CheckingReuse,
    /// Build logic is being evaluated; inputs are being collected.
    Collecting,
    /// The computed plan is being persisted.
    Saving,
    /// A cached plan is being materialized.
    Loading,
    /// The plan is ready to execute, either loaded or freshly saved.
    Ready,
}

impl CachePhase {
    fn name(self) -> &'static str {
        match self {
            CachePhase::Disabled => "Disabled",
            CachePhase::CheckingReuse => "CheckingReuse",
            CachePhase::Collecting => "Collecting",
            CachePhase::Saving => "Saving",
            CachePhase::Loading => "Loading",
            CachePhase::Ready => "Ready",
        }
    }
}

/// The outcome of the reuse decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The cached plan is valid; call [`ConfigurationCache::load`]
    /// instead of evaluating build logic.
    Reuse,
    /// The plan must be recomputed; the reason has already been logged.
    Recompute {
        /// Why the cached plan cannot be reused.
        reason: String,
    },
}

/// Detaches the fingerprint observer when the evaluation scope ends.
///
/// Returned by [`ConfigurationCache::start_collecting`]; dropping it
/// removes the observer from the value-source factory, on the success
/// and failure paths alike.
pub struct CollectingScope {
    factory: Arc<dyn ValueSourceFactory>,
    observer: Option<Arc<dyn ValueSourceObserver>>,
}

impl Drop for CollectingScope {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.take() {
            self.factory.remove_observer(&observer);
        }
    }
}

/// The configuration cache for one build invocation.
pub struct ConfigurationCache {
    options: CacheOptions,
    start: StartParameter,
    tool_version: String,
    host: Arc<dyn BuildHost>,
    value_sources: Arc<dyn ValueSourceFactory>,
    hasher: Arc<dyn FileHasher>,
    properties_loader: Arc<dyn BuildPropertiesLoader>,
    problems: ProblemSink,
    collector: Option<Arc<FingerprintCollector>>,
    location: Option<CacheLocation>,
    phase: CachePhase,
    reuse_checked: bool,
}

impl ConfigurationCache {
    /// Creates the cache for one invocation, deciding up front whether
    /// caching applies at all.
    ///
    /// The cache starts `Disabled` when the feature flag is off, when a
    /// dependency refresh forces recomputation, or when the build is the
    /// bootstrap sub-build that compiles the build logic itself. In the
    /// `Disabled` phase no collector is ever allocated, so nothing is
    /// retained for a build that will not be persisted.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: CacheOptions,
        start: StartParameter,
        tool_version: impl Into<String>,
        host: Arc<dyn BuildHost>,
        value_sources: Arc<dyn ValueSourceFactory>,
        hasher: Arc<dyn FileHasher>,
        properties_loader: Arc<dyn BuildPropertiesLoader>,
    ) -> Self {
        let mut phase = CachePhase::CheckingReuse;
        if !options.enabled {
            phase = CachePhase::Disabled;
        } else if start.refresh_dependencies {
            if !options.quiet {
                eprintln!("Configuration cache disabled because a dependency refresh was requested.");
            }
            phase = CachePhase::Disabled;
        } else if host.current_build().is_bootstrap() {
            phase = CachePhase::Disabled;
        }

        let collector = match phase {
            CachePhase::Disabled => None,
            _ => Some(Arc::new(FingerprintCollector::new(Arc::clone(&hasher)))),
        };

        Self {
            problems: ProblemSink::new(options.max_problems),
            options,
            start,
            tool_version: tool_version.into(),
            host,
            value_sources,
            hasher,
            properties_loader,
            collector,
            location: None,
            phase,
            reuse_checked: false,
        }
    }

    /// Returns the current lifecycle phase.
    pub fn phase(&self) -> CachePhase {
        self.phase
    }

    /// Returns the problems recorded so far.
    pub fn problems(&self) -> &ProblemSink {
        &self.problems
    }

    /// Returns the resolved entry location, deriving it on first use.
    pub fn location(&mut self) -> &CacheLocation {
        let start = &self.start;
        let tool_version = &self.tool_version;
        self.location.get_or_insert_with(|| {
            CacheLocation::resolve(&cache_key(start), &start.root_dir, tool_version)
        })
    }

    /// Decides whether the cached plan can be reused.
    ///
    /// On a miss or a fingerprint mismatch the specific reason is logged
    /// and the build proceeds to normal evaluation (`Collecting`). On a
    /// match the cache becomes `Ready` and [`load`](Self::load) may be
    /// called instead of evaluating build logic.
    pub fn check_reuse(&mut self) -> Result<CheckOutcome, CacheError> {
        match self.phase {
            CachePhase::Disabled => Ok(CheckOutcome::Recompute {
                reason: "the configuration cache is disabled".to_string(),
            }),
            CachePhase::CheckingReuse => {
                let location = self.location().clone();
                if !location.state_file.exists() {
                    if !self.options.quiet {
                        eprintln!(
                            "Calculating task graph as no configuration cache is available for tasks: {}",
                            self.start.requested_tasks.join(" ")
                        );
                    }
                    self.phase = CachePhase::Collecting;
                    return Ok(CheckOutcome::Recompute {
                        reason: "no cached configuration is available".to_string(),
                    });
                }

                self.properties_loader
                    .load_properties_from(&self.start.root_dir)
                    .map_err(CacheError::host)?;

                let resolver = self.host.encoders();
                let checked = check_fingerprint(
                    &location.fingerprint_file,
                    &self.tool_version,
                    self.hasher.as_ref(),
                    self.value_sources.as_ref(),
                    resolver.as_ref(),
                );
                match checked {
                    CheckedFingerprint::Valid => {
                        if !self.options.quiet {
                            eprintln!("Reusing configuration cache.");
                        }
                        self.phase = CachePhase::Ready;
                        self.reuse_checked = true;
                        Ok(CheckOutcome::Reuse)
                    }
                    CheckedFingerprint::Invalid(reason) => {
                        if !self.options.quiet {
                            eprintln!(
                                "Calculating task graph as configuration cache cannot be reused because {reason}."
                            );
                        }
                        self.phase = CachePhase::Collecting;
                        Ok(CheckOutcome::Recompute { reason })
                    }
                }
            }
            other => Err(phase_error("check_reuse", other)),
        }
    }

    /// Attaches the fingerprint collector for the evaluation phase.
    ///
    /// Returns a guard whose drop detaches the observer, so detachment
    /// happens exactly once even when evaluation fails. In the
    /// `Disabled` phase nothing is attached and the guard is inert.
    pub fn start_collecting(&mut self) -> Result<CollectingScope, CacheError> {
        match self.phase {
            CachePhase::Disabled => Ok(CollectingScope {
                factory: Arc::clone(&self.value_sources),
                observer: None,
            }),
            CachePhase::Collecting => {
                let collector = self
                    .collector
                    .clone()
                    .ok_or_else(|| phase_error("start_collecting", self.phase))?;
                let observer: Arc<dyn ValueSourceObserver> = collector;
                self.value_sources.add_observer(Arc::clone(&observer));
                Ok(CollectingScope {
                    factory: Arc::clone(&self.value_sources),
                    observer: Some(observer),
                })
            }
            other => Err(phase_error("start_collecting", other)),
        }
    }

    /// Persists the computed plan and its fingerprint.
    ///
    /// Serializes the build identity, the build-scoped event
    /// subscriptions, the ancestry-closed project-path sequence, and the
    /// work graph into the state file, then the collected fingerprint
    /// into its sibling file. If any step fails, the state file is
    /// deleted before the error is returned, so a later reuse check can
    /// never mistake a partial entry for a valid one. Recoverable
    /// per-value problems are rendered into the report directory rather
    /// than aborting. In the `Disabled` phase this is a no-op.
    pub fn save(&mut self) -> Result<(), CacheError> {
        match self.phase {
            CachePhase::Disabled => return Ok(()),
            CachePhase::Collecting => {}
            other => return Err(phase_error("save", other)),
        }
        self.phase = CachePhase::Saving;

        let location = self.location().clone();
        let result = self.try_save(&location);
        if result.is_err() {
            let _ = std::fs::remove_file(&location.state_file);
        } else {
            self.phase = CachePhase::Ready;
        }
        result
    }

    fn try_save(&self, location: &CacheLocation) -> Result<(), CacheError> {
        if let Some(parent) = location.state_file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let build = self.host.current_build();
        let resolver = self.host.encoders();

        entry::write_entry(&location.state_file, &self.tool_version, |ctx| {
            ctx.write_string(build.root_project_name())?;
            let set = resolver.encoder_set_for(&IsolateOwner::Build);
            ctx.with_isolate(IsolateOwner::Build, set, |ctx| {
                ctx.write_collection(build.event_subscriptions(), |ctx, subscription| {
                    graph_codec::write_payload_or_placeholder(
                        ctx,
                        subscription.provider.as_ref(),
                        &self.problems,
                    )
                })
            })?;
            graph_codec::write_work_graph(
                ctx,
                build.scheduled_work(),
                resolver.as_ref(),
                &self.problems,
            )
        })?;

        let collector = self
            .collector
            .as_ref()
            .ok_or_else(|| InternalError::new("saving without a fingerprint collector"))?;
        let fingerprint = collector.take_fingerprint();
        write_fingerprint_file(
            &location.fingerprint_file,
            &self.tool_version,
            &fingerprint,
            resolver.as_ref(),
        )?;

        let count = self.problems.total_count();
        if count > 0 {
            let report_path = ProblemReport::from_sink(&self.problems).render_to(&location.report_dir)?;
            if !self.options.quiet {
                eprintln!(
                    "{count} configuration cache problem(s) found, see the report at {}.",
                    report_path.display()
                );
            }
            if count > self.options.max_problems {
                return Err(CacheError::TooManyProblems {
                    count,
                    max: self.options.max_problems,
                });
            }
            if self.options.fail_on_problems {
                return Err(CacheError::ProblemsFound { count });
            }
        }
        Ok(())
    }

    /// Materializes the cached plan instead of evaluating build logic.
    ///
    /// Reads the build identity and asks the host for a build shell,
    /// re-attaches the build-scoped event subscriptions, registers every
    /// project in ancestor-before-descendant order, decodes the work
    /// graph against those projects, and hands it to the shell for
    /// scheduling. Only legal after [`check_reuse`](Self::check_reuse)
    /// returned [`CheckOutcome::Reuse`]; any failure here is fatal.
    pub fn load(&mut self) -> Result<Box<dyn BuildHandle>, CacheError> {
        if self.phase != CachePhase::Ready || !self.reuse_checked {
            return Err(phase_error("load", self.phase));
        }
        self.phase = CachePhase::Loading;

        let location = self.location().clone();
        let payload = entry::read_entry(&location.state_file, &self.tool_version).ok_or_else(|| {
            CacheError::Serialization {
                reason: format!(
                    "state file {} cannot be read",
                    location.state_file.display()
                ),
            }
        })?;
        let resolver = self.host.encoders();

        let mut input = payload.as_slice();
        let mut ctx = ReadContext::new(&mut input);

        let root_project_name = ctx.read_string()?;
        let mut handle = self
            .host
            .create_build(&root_project_name)
            .map_err(CacheError::host)?;

        let set = resolver.encoder_set_for(&IsolateOwner::Build);
        let subscriptions: Vec<EventSubscription> =
            ctx.with_isolate(IsolateOwner::Build, set, |ctx| {
                ctx.read_collection(|ctx| {
                    Ok(EventSubscription::new(
                        graph_codec::read_payload_or_placeholder(ctx)?,
                    ))
                })
            })?;
        handle
            .attach_subscriptions(subscriptions)
            .map_err(CacheError::host)?;

        let graph = graph_codec::read_work_graph(&mut ctx, resolver.as_ref(), &mut |path| {
            handle.register_project(path)
        })?;
        ctx.verify_seal()?;

        handle.schedule(graph).map_err(CacheError::host)?;
        self.phase = CachePhase::Ready;
        Ok(handle)
    }
}

fn phase_error(operation: &str, phase: CachePhase) -> CacheError {
    InternalError::new(format!(
        "{operation} invoked in phase {}",
        phase.name()
    ))
    .into()
}
