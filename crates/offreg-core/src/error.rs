//! Error types for the core crate.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while registering or looking up packages.
#[derive(Error, Diagnostic, Debug)]
pub enum RegistryError {
    #[error("Error while {action}: {source}")]
    #[diagnostic(code(offreg_core::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },

    #[error("Unreadable package source `{}`: {reason}", .path.display())]
    #[diagnostic(
        code(offreg_core::unreadable_source),
        help("Make sure the path is an npm tarball or a directory with a valid package.json")
    )]
    UnreadableSource { path: PathBuf, reason: String },

    #[error("Package '{name}' not found{}", requested_suffix(.file))]
    #[diagnostic(code(offreg_core::not_found))]
    NotFound { name: String, file: Option<String> },

    #[error("Failed to stream {file} of '{name}': {source}")]
    #[diagnostic(code(offreg_core::stream_failure))]
    StreamFailure {
        name: String,
        file: String,
        source: std::io::Error,
    },

    #[error("Registry has no service URL to build tarball links")]
    #[diagnostic(
        code(offreg_core::service_unavailable),
        help("Set a service provider on the registry before looking up metadata")
    )]
    ServiceUnavailable,

    #[error("Background task failed: {0}")]
    #[diagnostic(code(offreg_core::task))]
    Task(String),
}

fn requested_suffix(file: &Option<String>) -> String {
    file.as_deref()
        .map(|f| format!(" (requested {f})"))
        .unwrap_or_default()
}

impl RegistryError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            file: None,
        }
    }

    pub fn unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnreadableSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    /// Adds context to an error, describing what action was being performed.
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            RegistryError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
