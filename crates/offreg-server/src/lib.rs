//! HTTP service answering npm registry requests from an offreg [`Registry`].
//!
//! Two endpoints are served:
//!
//! - `GET /<name>`: the package metadata document
//! - `GET /<name>/-/<file>`: the tarball bytes
//!
//! [`Registry`]: offreg_core::Registry

pub mod error;
mod routes;
pub mod service;

pub use error::{Result, ServiceError};
pub use service::{Service, ServiceBinding, ServiceConfig};
