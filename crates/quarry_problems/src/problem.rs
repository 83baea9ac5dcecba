//! Structured problem records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a recorded problem is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// The value was stored in a degraded form; the cache entry is still
    /// usable.
    Warning,
    /// The value could not be stored faithfully.
    Failure,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Failure => f.write_str("failure"),
        }
    }
}

/// One problem encountered while serializing build state.
///
/// Problems name the value that could not be handled and, where known,
/// the location in the object graph it was reached from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Problem {
    /// The severity of the problem.
    pub severity: Severity,
    /// Human-readable description of what could not be stored and why.
    pub message: String,
    /// Where in the object graph the value was encountered, if known
    /// (e.g. a task path or a subscription index).
    pub trace: Option<String>,
}

impl Problem {
    /// Creates a failure-severity problem.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Failure,
            message: message.into(),
            trace: None,
        }
    }

    /// Creates a warning-severity problem.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            trace: None,
        }
    }

    /// Attaches an object-graph location to this problem.
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}
