//! Shared helpers for the offreg workspace.
//!
//! - [`path`]: `~` and environment variable expansion for user supplied paths
//! - [`concurrent`]: bounded fan-out over a list of inputs

pub mod concurrent;
pub mod error;
pub mod path;

pub use concurrent::map_concurrent;
pub use error::{PathError, PathResult, UtilsError};
