//! The configuration fingerprint: recorded external inputs and their
//! re-validation.
//!
//! During the configuration phase a collector observes every value
//! source the build logic queries and every configuration file it
//! reads. The recorded sequence is written next to the cache entry and
//! replayed before the next build: the first input whose current state
//! differs from the recorded one invalidates the entry, and the rest of
//! the fingerprint stream is deliberately abandoned unread.

use crate::entry;
use crate::error::CacheError;
use quarry_codec::{CodecError, EncoderResolver, IsolateOwner, ReadContext, WriteContext};
use quarry_common::ContentHash;
use quarry_model::{
    encode_property_value, system_property_name, FileHasher, ObtainedValue, ValueSourceFactory,
    ValueSourceObserver,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One recorded configuration file read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputFileRecord {
    /// The file that was read.
    pub path: PathBuf,
    /// Its content hash at fingerprint-write time, or `None` if the
    /// file could not be read then (e.g. it did not exist).
    pub hash: Option<ContentHash>,
}

/// The recorded external inputs of one configuration phase.
#[derive(Debug, Default)]
pub struct Fingerprint {
    /// Configuration files read, in observation order.
    pub input_files: Vec<InputFileRecord>,
    /// Values obtained through value sources, in observation order.
    pub obtained_values: Vec<ObtainedValue>,
}

struct CollectorState {
    input_files: Vec<InputFileRecord>,
    seen_files: BTreeSet<PathBuf>,
    obtained_values: Vec<ObtainedValue>,
    seen_values: BTreeSet<(String, String, Vec<u8>)>,
}

/// Observer collecting the fingerprint during the configuration phase.
///
/// Attached to the value-source factory while build logic is evaluated
/// and detached the moment evaluation ends. Files are hashed through
/// the external hashing collaborator at observation time; repeat
/// observations of the same file or the same value-source invocation
/// are recorded once.
pub struct FingerprintCollector {
    hasher: Arc<dyn FileHasher>,
    state: Mutex<CollectorState>,
}

impl FingerprintCollector {
    /// Creates an empty collector hashing files through `hasher`.
    pub fn new(hasher: Arc<dyn FileHasher>) -> Self {
        Self {
            hasher,
            state: Mutex::new(CollectorState {
                input_files: Vec::new(),
                seen_files: BTreeSet::new(),
                obtained_values: Vec::new(),
                seen_values: BTreeSet::new(),
            }),
        }
    }

    /// Returns the total number of records collected so far.
    pub fn record_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.input_files.len() + state.obtained_values.len()
    }

    /// Drains the collected records into a [`Fingerprint`].
    pub fn take_fingerprint(&self) -> Fingerprint {
        let mut state = self.state.lock().unwrap();
        Fingerprint {
            input_files: std::mem::take(&mut state.input_files),
            obtained_values: std::mem::take(&mut state.obtained_values),
        }
    }
}

impl ValueSourceObserver for FingerprintCollector {
    fn value_obtained(&self, value: &ObtainedValue) {
        let mut state = self.state.lock().unwrap();
        let key = (
            value.source_type.clone(),
            value.params_type.clone(),
            value.params.clone(),
        );
        if state.seen_values.insert(key) {
            state.obtained_values.push(value.clone());
        }
    }

    fn file_observed(&self, path: &Path) {
        let mut state = self.state.lock().unwrap();
        if state.seen_files.insert(path.to_path_buf()) {
            let hash = self.hasher.hash_of(path).ok();
            state.input_files.push(InputFileRecord {
                path: path.to_path_buf(),
                hash,
            });
        }
    }
}

/// Writes the fingerprint file for a cache entry.
///
/// Both record sequences are serialized inside a host-owned isolate:
/// files first, then obtained values, matching the order the check
/// replays them in.
pub fn write_fingerprint_file(
    path: &Path,
    tool_version: &str,
    fingerprint: &Fingerprint,
    resolver: &dyn EncoderResolver,
) -> Result<(), CacheError> {
    entry::write_entry(path, tool_version, |ctx| {
        let set = resolver.encoder_set_for(&IsolateOwner::Host);
        ctx.with_isolate(IsolateOwner::Host, set, |ctx| {
            ctx.write_collection(&fingerprint.input_files, write_input_file)?;
            ctx.write_collection(&fingerprint.obtained_values, write_obtained_value)
        })?;
        Ok(())
    })
}

fn write_input_file(ctx: &mut WriteContext<'_>, record: &InputFileRecord) -> Result<(), CodecError> {
    ctx.write_string(&record.path.to_string_lossy())?;
    match &record.hash {
        Some(hash) => {
            ctx.write_u8(1)?;
            ctx.write_raw(hash.as_raw())
        }
        None => ctx.write_u8(0),
    }
}

fn read_input_file(ctx: &mut ReadContext<'_>) -> Result<InputFileRecord, CodecError> {
    let path = PathBuf::from(ctx.read_string()?);
    let hash = match ctx.read_u8()? {
        0 => None,
        1 => {
            let mut raw = [0u8; 16];
            ctx.read_raw(&mut raw)?;
            Some(ContentHash::from_raw(raw))
        }
        other => {
            return Err(CodecError::malformed(format!(
                "invalid hash presence byte {other:#04x}"
            )))
        }
    };
    Ok(InputFileRecord { path, hash })
}

fn write_obtained_value(
    ctx: &mut WriteContext<'_>,
    value: &ObtainedValue,
) -> Result<(), CodecError> {
    ctx.write_string(&value.source_type)?;
    ctx.write_string(&value.params_type)?;
    ctx.write_bytes(&value.params)?;
    ctx.write_bytes(&value.value)
}

fn read_obtained_value(ctx: &mut ReadContext<'_>) -> Result<ObtainedValue, CodecError> {
    Ok(ObtainedValue {
        source_type: ctx.read_string()?,
        params_type: ctx.read_string()?,
        params: ctx.read_bytes()?,
        value: ctx.read_bytes()?,
    })
}

/// The outcome of checking a fingerprint against current reality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckedFingerprint {
    /// Every recorded input matches; the cached plan may be reused.
    Valid,
    /// An input differs; the reason names the offending file or value.
    Invalid(String),
}

/// Checks the recorded fingerprint against the current state of every
/// input, short-circuiting on the first mismatch.
///
/// Stage one recomputes each recorded file's content hash; stage two
/// re-obtains each recorded value. A mismatch abandons the stream
/// immediately without draining the remaining records. System property
/// sources are read directly from the process environment rather than
/// through the generic machinery, because this check runs before
/// command-line-supplied properties have been propagated into it.
///
/// This is pure validation: it reads the fingerprint file and queries
/// collaborators, mutating nothing. An unreadable fingerprint is an
/// invalidation reason, not an error.
pub fn check_fingerprint(
    path: &Path,
    tool_version: &str,
    hasher: &dyn FileHasher,
    value_sources: &dyn ValueSourceFactory,
    resolver: &dyn EncoderResolver,
) -> CheckedFingerprint {
    let Some(payload) = entry::read_entry(path, tool_version) else {
        return CheckedFingerprint::Invalid(
            "the cached fingerprint cannot be read".to_string(),
        );
    };

    let mut input = payload.as_slice();
    let mut ctx = ReadContext::new(&mut input);
    let set = resolver.encoder_set_for(&IsolateOwner::Host);
    let result = ctx.with_isolate(IsolateOwner::Host, set, |ctx| {
        if let Some(reason) = ctx.read_collection_until(|ctx| {
            let record = read_input_file(ctx)?;
            Ok(changed_file_reason(&record, hasher))
        })? {
            return Ok(Some(reason));
        }
        ctx.read_collection_until(|ctx| {
            let value = read_obtained_value(ctx)?;
            Ok(changed_value_reason(&value, value_sources))
        })
    });

    match result {
        Ok(None) => CheckedFingerprint::Valid,
        Ok(Some(reason)) => CheckedFingerprint::Invalid(reason),
        Err(e) => CheckedFingerprint::Invalid(format!(
            "the cached fingerprint cannot be checked: {e}"
        )),
    }
}

fn changed_file_reason(record: &InputFileRecord, hasher: &dyn FileHasher) -> Option<String> {
    let current = hasher.hash_of(&record.path).ok();
    (current != record.hash).then(|| {
        format!(
            "configuration file '{}' has changed",
            record.path.display()
        )
    })
}

fn changed_value_reason(
    recorded: &ObtainedValue,
    value_sources: &dyn ValueSourceFactory,
) -> Option<String> {
    if recorded.source_type == quarry_model::SYSTEM_PROPERTY_SOURCE {
        let Some(name) = system_property_name(&recorded.params) else {
            return Some("a recorded system property cannot be decoded".to_string());
        };
        let current = encode_property_value(std::env::var(&name).ok().as_deref());
        return (current != recorded.value)
            .then(|| format!("system property '{name}' has changed"));
    }

    let current = value_sources
        .instantiate(&recorded.source_type, &recorded.params_type, &recorded.params)
        .and_then(|source| source.obtain());
    match current {
        Ok(current) if current == recorded.value => None,
        Ok(_) => Some(format!(
            "build logic input of type '{}' has changed",
            recorded.source_type
        )),
        Err(_) => Some(format!(
            "build logic input of type '{}' cannot be re-obtained",
            recorded.source_type
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_codec::EncoderSet;
    use quarry_model::{HostError, ValueSource, XxFileHasher};
    use std::collections::BTreeMap;

    struct EmptyResolver;

    impl EncoderResolver for EmptyResolver {
        fn encoder_set_for(&self, _owner: &IsolateOwner) -> Arc<EncoderSet> {
            Arc::new(EncoderSet::new())
        }
    }

    /// Factory whose sources return fixed values from a map.
    struct MapFactory {
        values: BTreeMap<String, Vec<u8>>,
    }

    struct FixedSource(Option<Vec<u8>>);

    impl ValueSource for FixedSource {
        fn obtain(&self) -> Result<Vec<u8>, HostError> {
            self.0.clone().ok_or_else(|| "no such source".into())
        }
    }

    impl ValueSourceFactory for MapFactory {
        fn add_observer(&self, _observer: Arc<dyn ValueSourceObserver>) {}
        fn remove_observer(&self, _observer: &Arc<dyn ValueSourceObserver>) {}
        fn instantiate(
            &self,
            source_type: &str,
            _params_type: &str,
            _params: &[u8],
        ) -> Result<Box<dyn ValueSource>, HostError> {
            Ok(Box::new(FixedSource(self.values.get(source_type).cloned())))
        }
    }

    fn value(source_type: &str, value: &[u8]) -> ObtainedValue {
        ObtainedValue {
            source_type: source_type.to_string(),
            params_type: "test.params".to_string(),
            params: Vec::new(),
            value: value.to_vec(),
        }
    }

    fn check(
        dir: &Path,
        fingerprint: &Fingerprint,
        factory: &MapFactory,
    ) -> CheckedFingerprint {
        let path = dir.join("entry.bin.fingerprint");
        write_fingerprint_file(&path, "1.4.0", fingerprint, &EmptyResolver).unwrap();
        check_fingerprint(&path, "1.4.0", &XxFileHasher, factory, &EmptyResolver)
    }

    #[test]
    fn collector_dedupes_files_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.quarry");
        std::fs::write(&file, "root").unwrap();

        let collector = FingerprintCollector::new(Arc::new(XxFileHasher));
        collector.file_observed(&file);
        collector.file_observed(&file);
        collector.value_obtained(&value("env.source", b"ci"));
        collector.value_obtained(&value("env.source", b"ci"));
        collector.value_obtained(&value("other.source", b"x"));

        assert_eq!(collector.record_count(), 3);
        let fp = collector.take_fingerprint();
        assert_eq!(fp.input_files.len(), 1);
        assert_eq!(fp.obtained_values.len(), 2);
        // Drained: a second take yields nothing.
        assert_eq!(collector.take_fingerprint().input_files.len(), 0);
    }

    #[test]
    fn collector_records_unreadable_file_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let collector = FingerprintCollector::new(Arc::new(XxFileHasher));
        collector.file_observed(&dir.path().join("missing.quarry"));
        let fp = collector.take_fingerprint();
        assert_eq!(fp.input_files.len(), 1);
        assert!(fp.input_files[0].hash.is_none());
    }

    #[test]
    fn all_unchanged_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.quarry");
        std::fs::write(&file, "root").unwrap();

        let fingerprint = Fingerprint {
            input_files: vec![InputFileRecord {
                path: file,
                hash: Some(ContentHash::from_bytes(b"root")),
            }],
            obtained_values: vec![value("env.source", b"ci")],
        };
        let factory = MapFactory {
            values: BTreeMap::from([("env.source".to_string(), b"ci".to_vec())]),
        };
        assert_eq!(
            check(dir.path(), &fingerprint, &factory),
            CheckedFingerprint::Valid
        );
    }

    #[test]
    fn changed_file_invalidates_with_file_reason() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.quarry");
        std::fs::write(&file, "edited").unwrap();

        let fingerprint = Fingerprint {
            input_files: vec![InputFileRecord {
                path: file.clone(),
                hash: Some(ContentHash::from_bytes(b"original")),
            }],
            obtained_values: vec![value("env.source", b"ci")],
        };
        let factory = MapFactory {
            values: BTreeMap::from([("env.source".to_string(), b"ci".to_vec())]),
        };
        match check(dir.path(), &fingerprint, &factory) {
            CheckedFingerprint::Invalid(reason) => {
                assert!(reason.contains("configuration file"));
                assert!(reason.contains("settings.quarry"));
            }
            other => panic!("expected invalidation, got {other:?}"),
        }
    }

    #[test]
    fn deleted_file_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.quarry");

        let fingerprint = Fingerprint {
            input_files: vec![InputFileRecord {
                path: file,
                hash: Some(ContentHash::from_bytes(b"was here")),
            }],
            obtained_values: Vec::new(),
        };
        let factory = MapFactory {
            values: BTreeMap::new(),
        };
        assert!(matches!(
            check(dir.path(), &fingerprint, &factory),
            CheckedFingerprint::Invalid(_)
        ));
    }

    #[test]
    fn changed_value_invalidates_with_input_reason() {
        let dir = tempfile::tempdir().unwrap();
        let fingerprint = Fingerprint {
            input_files: Vec::new(),
            obtained_values: vec![value("env.source", b"ci")],
        };
        let factory = MapFactory {
            values: BTreeMap::from([("env.source".to_string(), b"local".to_vec())]),
        };
        match check(dir.path(), &fingerprint, &factory) {
            CheckedFingerprint::Invalid(reason) => {
                assert!(reason.contains("build logic input"));
                assert!(reason.contains("env.source"));
            }
            other => panic!("expected invalidation, got {other:?}"),
        }
    }

    #[test]
    fn file_mismatch_reported_before_value_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.quarry");
        std::fs::write(&file, "edited").unwrap();

        let fingerprint = Fingerprint {
            input_files: vec![InputFileRecord {
                path: file,
                hash: Some(ContentHash::from_bytes(b"original")),
            }],
            obtained_values: vec![value("env.source", b"ci")],
        };
        // The value mismatches too, but stage one wins.
        let factory = MapFactory {
            values: BTreeMap::from([("env.source".to_string(), b"other".to_vec())]),
        };
        match check(dir.path(), &fingerprint, &factory) {
            CheckedFingerprint::Invalid(reason) => {
                assert!(reason.contains("configuration file"));
            }
            other => panic!("expected invalidation, got {other:?}"),
        }
    }

    #[test]
    fn system_property_read_from_process_environment() {
        let dir = tempfile::tempdir().unwrap();
        let name = "QUARRY_FP_TEST_PROPERTY";
        std::env::set_var(name, "recorded");

        let recorded = ObtainedValue {
            source_type: quarry_model::SYSTEM_PROPERTY_SOURCE.to_string(),
            params_type: "sysprop.params".to_string(),
            params: quarry_model::system_property_params(name),
            value: encode_property_value(Some("recorded")),
        };
        let fingerprint = Fingerprint {
            input_files: Vec::new(),
            obtained_values: vec![recorded.clone()],
        };
        // The generic factory knows nothing about this source; the check
        // must not consult it for system properties.
        let factory = MapFactory {
            values: BTreeMap::new(),
        };
        assert_eq!(
            check(dir.path(), &fingerprint, &factory),
            CheckedFingerprint::Valid
        );

        std::env::set_var(name, "drifted");
        let fingerprint = Fingerprint {
            input_files: Vec::new(),
            obtained_values: vec![recorded],
        };
        match check(dir.path(), &fingerprint, &factory) {
            CheckedFingerprint::Invalid(reason) => {
                assert!(reason.contains(name));
            }
            other => panic!("expected invalidation, got {other:?}"),
        }
        std::env::remove_var(name);
    }

    #[test]
    fn missing_fingerprint_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MapFactory {
            values: BTreeMap::new(),
        };
        let result = check_fingerprint(
            &dir.path().join("absent.fingerprint"),
            "1.4.0",
            &XxFileHasher,
            &factory,
            &EmptyResolver,
        );
        assert!(matches!(result, CheckedFingerprint::Invalid(_)));
    }
}
