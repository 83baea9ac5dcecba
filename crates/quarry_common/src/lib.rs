//! Shared foundational types for the Quarry configuration cache.
//!
//! This crate provides content hashing, hierarchical project paths, and
//! common result types used across the cache engine.

#![warn(missing_docs)]

pub mod hash;
pub mod project_path;
pub mod result;

pub use hash::ContentHash;
pub use project_path::{ParseProjectPathError, ProjectPath};
pub use result::{InternalError, QuarryResult};
