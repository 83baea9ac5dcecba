//! Hierarchical project paths within a build.
//!
//! A project path names one project in the build tree using
//! colon-separated segments: `:` is the root project, `:app` a direct
//! child, `:app:web` a grandchild. Paths are ordered and hashable so
//! they can key sorted sets and appear in deterministic wire sequences.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The path of a project within the build tree.
///
/// Internally stores the canonical string form. The root project is the
/// single-colon path `:`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectPath(String);

impl ProjectPath {
    /// Returns the root project path `:`.
    pub fn root() -> Self {
        Self(":".to_string())
    }

    /// Returns `true` if this is the root project path.
    pub fn is_root(&self) -> bool {
        self.0 == ":"
    }

    /// Returns the last path segment, or an empty string for the root.
    pub fn name(&self) -> &str {
        match self.0.rfind(':') {
            Some(idx) => &self.0[idx + 1..],
            None => "",
        }
    }

    /// Returns the parent path, or `None` for the root.
    pub fn parent(&self) -> Option<ProjectPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(':') {
            Some(0) => Some(ProjectPath::root()),
            Some(idx) => Some(ProjectPath(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Returns `true` if this path is a strict ancestor of `other`.
    ///
    /// The root is an ancestor of every other path. A path is never an
    /// ancestor of itself.
    pub fn is_ancestor_of(&self, other: &ProjectPath) -> bool {
        if self == other {
            return false;
        }
        if self.is_root() {
            return true;
        }
        other.0.starts_with(&self.0) && other.0.as_bytes().get(self.0.len()) == Some(&b':')
    }

    /// Returns the child of this path with the given segment name.
    pub fn child(&self, name: &str) -> ProjectPath {
        if self.is_root() {
            ProjectPath(format!(":{name}"))
        } else {
            ProjectPath(format!("{}:{name}", self.0))
        }
    }

    /// Returns the canonical string form of this path.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectPath({})", self.0)
    }
}

impl FromStr for ProjectPath {
    type Err = ParseProjectPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ":" {
            return Ok(ProjectPath::root());
        }
        if !s.starts_with(':') {
            return Err(ParseProjectPathError::NotAbsolute(s.to_string()));
        }
        if s.ends_with(':') || s[1..].split(':').any(str::is_empty) {
            return Err(ParseProjectPathError::EmptySegment(s.to_string()));
        }
        Ok(ProjectPath(s.to_string()))
    }
}

/// Error returned when parsing an invalid project path string.
#[derive(Debug, thiserror::Error)]
pub enum ParseProjectPathError {
    /// The path does not start with `:`.
    #[error("project path {0:?} must start with ':'")]
    NotAbsolute(String),

    /// The path contains an empty segment (e.g. `:a::b` or `:a:`).
    #[error("project path {0:?} contains an empty segment")]
    EmptySegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ProjectPath {
        s.parse().unwrap()
    }

    #[test]
    fn root_path() {
        let root = ProjectPath::root();
        assert!(root.is_root());
        assert_eq!(root.as_str(), ":");
        assert_eq!(root.name(), "");
        assert!(root.parent().is_none());
    }

    #[test]
    fn parse_and_display() {
        let p = path(":app:web");
        assert_eq!(p.to_string(), ":app:web");
        assert_eq!(p.name(), "web");
    }

    #[test]
    fn parse_rejects_relative() {
        assert!("app:web".parse::<ProjectPath>().is_err());
    }

    #[test]
    fn parse_rejects_empty_segments() {
        assert!(":app::web".parse::<ProjectPath>().is_err());
        assert!(":app:".parse::<ProjectPath>().is_err());
    }

    #[test]
    fn parent_chain() {
        let p = path(":app:web:ui");
        assert_eq!(p.parent(), Some(path(":app:web")));
        assert_eq!(path(":app:web").parent(), Some(path(":app")));
        assert_eq!(path(":app").parent(), Some(ProjectPath::root()));
    }

    #[test]
    fn ancestry() {
        let root = ProjectPath::root();
        let app = path(":app");
        let web = path(":app:web");
        assert!(root.is_ancestor_of(&app));
        assert!(root.is_ancestor_of(&web));
        assert!(app.is_ancestor_of(&web));
        assert!(!web.is_ancestor_of(&app));
        assert!(!app.is_ancestor_of(&app));
    }

    #[test]
    fn ancestry_requires_segment_boundary() {
        // ":app" is not an ancestor of ":apple"
        assert!(!path(":app").is_ancestor_of(&path(":apple")));
    }

    #[test]
    fn child_of_root_and_nested() {
        assert_eq!(ProjectPath::root().child("app"), path(":app"));
        assert_eq!(path(":app").child("web"), path(":app:web"));
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut paths = vec![path(":b"), path(":a:z"), path(":a")];
        paths.sort();
        assert_eq!(paths, vec![path(":a"), path(":a:z"), path(":b")]);
    }
}
