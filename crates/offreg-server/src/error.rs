//! Error types for the service.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ServiceError {
    #[error("Failed to bind {addr}: {source}")]
    #[diagnostic(
        code(offreg_server::bind_failure),
        help("Check that the host resolves locally and the port is free")
    )]
    BindFailure {
        addr: String,
        source: std::io::Error,
    },

    #[error("Service cannot {action} while {state}")]
    #[diagnostic(code(offreg_server::invalid_state))]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    #[error("Invalid service URL: {0}")]
    #[diagnostic(code(offreg_server::url))]
    Url(#[from] url::ParseError),

    #[error("Server task failed: {0}")]
    #[diagnostic(code(offreg_server::task))]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
