//! Source backends.
//!
//! A backend turns one kind of local path into catalog entries. Backends are
//! tried in order; the first one returning a non-empty list wins.

pub mod directory;
pub mod tarball;

use std::{
    fs::File,
    io::{ErrorKind, Read},
    path::Path,
};

use crate::{catalog::CatalogEntry, error::Result, ErrorContext};

/// Magic bytes at the start of every gzip stream.
pub const GZIP_MAGIC_BYTES: [u8; 2] = [0x1f, 0x8b];

/// Name of the manifest file at the package root.
pub const MANIFEST_FILE: &str = "package.json";

/// A capability that turns local sources into catalog entries.
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Inspects `path`.
    ///
    /// Returns an empty list when the path is not this backend's kind. Fails
    /// with [`crate::RegistryError::UnreadableSource`] when it is, but cannot
    /// be parsed.
    fn try_register(&self, path: &Path) -> Result<Vec<CatalogEntry>>;
}

/// Checks whether the file at `path` starts with [`GZIP_MAGIC_BYTES`].
///
/// Files shorter than the magic are simply not gzip.
pub fn is_gzip(path: &Path) -> Result<bool> {
    let mut file =
        File::open(path).with_context(|| format!("opening {}", path.display()))?;

    let mut magic_bytes = [0u8; 2];
    match file.read_exact(&mut magic_bytes) {
        Ok(()) => Ok(magic_bytes == GZIP_MAGIC_BYTES),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => {
            Err(err).with_context(|| format!("reading magic bytes of {}", path.display()))
        }
    }
}
