//! Cache identity: deriving the key and on-disk location of a cache
//! entry from the build invocation.

use quarry_common::ContentHash;
use quarry_model::StartParameter;
use std::path::{Path, PathBuf};

/// Name of the cache directory under the build root.
pub const CACHE_DIR_NAME: &str = ".quarry";

/// Derives the cache key string for a build invocation.
///
/// The key is built from the requested task names ('/'-joined in
/// order), the excluded task names (appended behind a `/-` marker), and
/// a `*`-prefixed relative invocation directory. The directory suffix
/// only applies when at least one task name is unqualified (does not
/// start with `:`), because only then does the invocation directory
/// affect task resolution; it is omitted when the invocation directory
/// is the root itself or lies outside it.
///
/// This is a pure function of its inputs, so identical invocations
/// always address the same cache entry.
pub fn cache_key(start: &StartParameter) -> String {
    let mut key = String::new();
    for (i, task) in start.requested_tasks.iter().enumerate() {
        if i > 0 {
            key.push('/');
        }
        key.push_str(task);
    }
    if !start.excluded_tasks.is_empty() {
        key.push_str("/-");
        for (i, task) in start.excluded_tasks.iter().enumerate() {
            if i > 0 {
                key.push('/');
            }
            key.push_str(task);
        }
    }
    let has_unqualified_name = start
        .requested_tasks
        .iter()
        .chain(start.excluded_tasks.iter())
        .any(|task| !task.starts_with(':'));
    if has_unqualified_name {
        if let Some(relative_dir) = relative_invocation_dir(start) {
            key.push('*');
            key.push_str(&relative_dir);
        }
    }
    key
}

/// Returns the invocation directory relative to the root as a
/// '/'-separated string, or `None` when it is the root itself or not a
/// descendant of it.
fn relative_invocation_dir(start: &StartParameter) -> Option<String> {
    let relative = start.invocation_dir.strip_prefix(&start.root_dir).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(segments.join("/"))
}

/// The resolved on-disk location of one cache entry.
///
/// Computed lazily once per build invocation and immutable thereafter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheLocation {
    /// The serialized build state.
    pub state_file: PathBuf,
    /// The fingerprint of observed external inputs.
    pub fingerprint_file: PathBuf,
    /// Directory for the problem report of this entry.
    pub report_dir: PathBuf,
}

impl CacheLocation {
    /// Resolves the location for a cache key under
    /// `<root>/.quarry/<tool-version>/`.
    ///
    /// The key is digested to a fixed-length name safe for filesystems;
    /// the fingerprint file sits next to the state file, and the report
    /// directory is named after the state file's stem.
    pub fn resolve(key: &str, root_dir: &Path, tool_version: &str) -> Self {
        let digest = ContentHash::from_bytes(key.as_bytes()).to_string();
        let entry_dir = root_dir.join(CACHE_DIR_NAME).join(tool_version);
        Self {
            state_file: entry_dir.join(format!("{digest}.bin")),
            fingerprint_file: entry_dir.join(format!("{digest}.bin.fingerprint")),
            report_dir: entry_dir.join(digest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(root: &str) -> StartParameter {
        StartParameter::new(root)
    }

    #[test]
    fn key_is_pure() {
        let a = start("/work/demo").with_tasks(["build", "check"]);
        let b = start("/work/demo").with_tasks(["build", "check"]);
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn key_changes_with_any_task_name() {
        let a = start("/work/demo").with_tasks([":app:build"]);
        let b = start("/work/demo").with_tasks([":app:check"]);
        assert_ne!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn requested_tasks_joined_in_order() {
        let s = start("/work/demo").with_tasks([":a", ":b"]);
        assert_eq!(cache_key(&s), ":a/:b");
        let reversed = start("/work/demo").with_tasks([":b", ":a"]);
        assert_ne!(cache_key(&s), cache_key(&reversed));
    }

    #[test]
    fn excluded_tasks_append_behind_marker() {
        let s = start("/work/demo")
            .with_tasks([":app:build"])
            .with_excluded([":app:test", ":app:lint"]);
        assert_eq!(cache_key(&s), ":app:build/-:app:test/:app:lint");
    }

    #[test]
    fn qualified_tasks_ignore_invocation_dir() {
        let s = start("/work/demo")
            .with_tasks([":app:build"])
            .invoked_from("/work/demo/app");
        assert_eq!(cache_key(&s), ":app:build");
        assert!(!cache_key(&s).contains('*'));
    }

    #[test]
    fn unqualified_task_from_subdirectory_adds_suffix() {
        let s = start("/work/demo")
            .with_tasks(["build"])
            .invoked_from("/work/demo/sub");
        assert!(cache_key(&s).ends_with("*sub"));
    }

    #[test]
    fn unqualified_task_from_nested_subdirectory() {
        let s = start("/work/demo")
            .with_tasks(["build"])
            .invoked_from("/work/demo/app/web");
        assert_eq!(cache_key(&s), "build*app/web");
    }

    #[test]
    fn unqualified_task_from_root_has_no_suffix() {
        let s = start("/work/demo").with_tasks(["build"]);
        assert_eq!(cache_key(&s), "build");
    }

    #[test]
    fn invocation_outside_root_has_no_suffix() {
        let s = start("/work/demo")
            .with_tasks(["build"])
            .invoked_from("/elsewhere/dir");
        assert_eq!(cache_key(&s), "build");
    }

    #[test]
    fn unqualified_excluded_task_also_triggers_suffix() {
        let s = start("/work/demo")
            .with_tasks([":app:build"])
            .with_excluded(["test"])
            .invoked_from("/work/demo/sub");
        assert!(cache_key(&s).ends_with("*sub"));
    }

    #[test]
    fn location_layout() {
        let loc = CacheLocation::resolve("build", Path::new("/work/demo"), "1.4.0");
        let digest = ContentHash::from_bytes(b"build").to_string();
        assert_eq!(
            loc.state_file,
            PathBuf::from(format!("/work/demo/.quarry/1.4.0/{digest}.bin"))
        );
        assert_eq!(
            loc.fingerprint_file,
            PathBuf::from(format!("/work/demo/.quarry/1.4.0/{digest}.bin.fingerprint"))
        );
        assert_eq!(
            loc.report_dir,
            PathBuf::from(format!("/work/demo/.quarry/1.4.0/{digest}"))
        );
    }

    #[test]
    fn location_varies_with_key_and_version() {
        let root = Path::new("/work/demo");
        let a = CacheLocation::resolve("build", root, "1.4.0");
        let b = CacheLocation::resolve("check", root, "1.4.0");
        let c = CacheLocation::resolve("build", root, "1.5.0");
        assert_ne!(a.state_file, b.state_file);
        assert_ne!(a.state_file, c.state_file);
    }
}
