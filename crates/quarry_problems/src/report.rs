//! JSON report rendering.

use crate::problem::Problem;
use crate::sink::ProblemSink;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the report file written into the report directory.
const REPORT_FILE: &str = "configuration-cache-report.json";

/// A rendered problem report for one cache entry.
///
/// Contains the retained problems, the total count (which may exceed the
/// number retained), and whether truncation occurred.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProblemReport {
    /// Total number of problems recorded, including truncated ones.
    pub total_count: usize,
    /// Whether problems beyond the retention cap were dropped.
    pub truncated: bool,
    /// The retained problem records.
    pub problems: Vec<Problem>,
}

impl ProblemReport {
    /// Builds a report from the sink's current contents.
    pub fn from_sink(sink: &ProblemSink) -> Self {
        let problems = sink.problems();
        let total_count = sink.total_count();
        Self {
            truncated: total_count > problems.len(),
            total_count,
            problems,
        }
    }

    /// Writes the report as pretty-printed JSON into `dir`.
    ///
    /// Creates the directory if it does not exist. Returns the path of
    /// the written report file.
    pub fn render_to(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(dir).map_err(|e| ReportError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = dir.join(REPORT_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| ReportError::Render {
            reason: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| ReportError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }
}

/// Errors that can occur while rendering a problem report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// An I/O error occurred while writing the report.
    #[error("report I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The report could not be serialized to JSON.
    #[error("failed to render report: {reason}")]
    Render {
        /// Description of the serialization failure.
        reason: String,
    },
}
