//! Package catalog and source backends for the offreg offline npm registry.
//!
//! Local paths are turned into catalog entries by an ordered list of
//! [`Backend`]s. The [`Registry`] owns the catalog and answers the two
//! questions an npm client asks: "which versions of this package exist" and
//! "give me the tarball for this version".
//!
//! # Supported sources
//!
//! - **Tarballs**: gzip compressed archives as produced by `npm pack`; served verbatim
//! - **Directories**: unpacked package sources; packed into a tarball on request
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use offreg_config::config::LatestPolicy;
//! use offreg_core::{DirectoryBackend, Registry, TarballBackend};
//!
//! async fn serve_local(paths: Vec<String>) -> offreg_core::Result<usize> {
//!     let mut registry = Registry::new(LatestPolicy::Highest);
//!     registry.add_backend(Arc::new(TarballBackend));
//!     registry.add_backend(Arc::new(DirectoryBackend));
//!
//!     let mut total = 0;
//!     for path in paths {
//!         total += registry.register(path).await?;
//!     }
//!     Ok(total)
//! }
//! ```

pub mod backend;
pub mod catalog;
pub mod error;
pub mod manifest;
pub mod metadata;
pub mod registry;
pub mod stream;

pub use backend::{directory::DirectoryBackend, tarball::TarballBackend, Backend};
pub use catalog::{Catalog, CatalogEntry, SourceKind};
pub use error::{ErrorContext, RegistryError, Result};
pub use manifest::PackageManifest;
pub use metadata::{Dist, PackageMetadata, VersionMetadata};
pub use registry::{Registry, UrlProvider};
pub use stream::TarballStream;
