//! Environment-level cache option resolution.
//!
//! Each flag is resolved by checking a command-line-supplied override
//! first, then falling back to a process-wide property, then to its
//! default. The engine never defines a fixed CLI; the host hands in
//! whatever overrides its own command line produced.

use std::collections::BTreeMap;

/// Property enabling the configuration cache.
pub const ENABLED_PROPERTY: &str = "quarry.configuration-cache";

/// Property suppressing informational cache log lines.
pub const QUIET_PROPERTY: &str = "quarry.configuration-cache.quiet";

/// Property bounding how many serialization problems are retained.
pub const MAX_PROBLEMS_PROPERTY: &str = "quarry.configuration-cache.max-problems";

/// Property turning any recorded problem into a save failure.
pub const FAIL_ON_PROBLEMS_PROPERTY: &str = "quarry.configuration-cache.fail-on-problems";

/// Default problem retention bound.
pub const DEFAULT_MAX_PROBLEMS: usize = 512;

/// Resolved cache behavior flags for one build invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheOptions {
    /// Whether the configuration cache is enabled at all.
    pub enabled: bool,
    /// Whether informational log lines are suppressed.
    pub quiet: bool,
    /// Maximum number of serialization problems tolerated per save.
    pub max_problems: usize,
    /// Whether any recorded problem fails the save.
    pub fail_on_problems: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            quiet: false,
            max_problems: DEFAULT_MAX_PROBLEMS,
            fail_on_problems: false,
        }
    }
}

impl CacheOptions {
    /// Resolves options from command-line overrides with a process-wide
    /// property fallback.
    ///
    /// `env` is the process-wide property lookup (typically
    /// `std::env::var(..).ok()`); injecting it keeps resolution testable.
    pub fn resolve(
        overrides: &BTreeMap<String, String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let lookup = |name: &str| overrides.get(name).cloned().or_else(|| env(name));
        let defaults = Self::default();
        Self {
            enabled: parse_flag(lookup(ENABLED_PROPERTY), defaults.enabled),
            quiet: parse_flag(lookup(QUIET_PROPERTY), defaults.quiet),
            max_problems: parse_count(lookup(MAX_PROBLEMS_PROPERTY), defaults.max_problems),
            fail_on_problems: parse_flag(
                lookup(FAIL_ON_PROBLEMS_PROPERTY),
                defaults.fail_on_problems,
            ),
        }
    }

    /// Resolves options against the real process environment.
    pub fn from_process(overrides: &BTreeMap<String, String>) -> Self {
        Self::resolve(overrides, |name| std::env::var(name).ok())
    }
}

/// Parses a boolean flag value. A bare present flag (empty value) counts
/// as `true`; anything unrecognized falls back to the default.
fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref() {
        Some("") | Some("true") => true,
        Some("false") => false,
        Some(_) => default,
        None => default,
    }
}

/// Parses a count value, falling back to the default on malformed input.
fn parse_count(value: Option<String>, default: usize) -> usize {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_any_source() {
        let opts = CacheOptions::resolve(&BTreeMap::new(), no_env);
        assert_eq!(opts, CacheOptions::default());
        assert!(!opts.enabled);
        assert_eq!(opts.max_problems, DEFAULT_MAX_PROBLEMS);
    }

    #[test]
    fn override_wins_over_env() {
        let ov = overrides(&[(ENABLED_PROPERTY, "false")]);
        let opts = CacheOptions::resolve(&ov, |name| {
            (name == ENABLED_PROPERTY).then(|| "true".to_string())
        });
        assert!(!opts.enabled);
    }

    #[test]
    fn env_fallback_applies() {
        let opts = CacheOptions::resolve(&BTreeMap::new(), |name| {
            (name == ENABLED_PROPERTY).then(|| "true".to_string())
        });
        assert!(opts.enabled);
    }

    #[test]
    fn bare_flag_counts_as_true() {
        let ov = overrides(&[(ENABLED_PROPERTY, ""), (QUIET_PROPERTY, "")]);
        let opts = CacheOptions::resolve(&ov, no_env);
        assert!(opts.enabled);
        assert!(opts.quiet);
    }

    #[test]
    fn max_problems_parses_and_falls_back() {
        let ov = overrides(&[(MAX_PROBLEMS_PROPERTY, "16")]);
        let opts = CacheOptions::resolve(&ov, no_env);
        assert_eq!(opts.max_problems, 16);

        let ov = overrides(&[(MAX_PROBLEMS_PROPERTY, "a lot")]);
        let opts = CacheOptions::resolve(&ov, no_env);
        assert_eq!(opts.max_problems, DEFAULT_MAX_PROBLEMS);
    }

    #[test]
    fn unrecognized_flag_value_keeps_default() {
        let ov = overrides(&[(FAIL_ON_PROBLEMS_PROPERTY, "maybe")]);
        let opts = CacheOptions::resolve(&ov, no_env);
        assert!(!opts.fail_on_problems);
    }
}
