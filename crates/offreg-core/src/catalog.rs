//! In-memory package catalog.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use offreg_config::config::LatestPolicy;
use semver::Version;

use crate::manifest::PackageManifest;

/// Where the bytes of a catalog entry come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// A pre-built `.tgz`, streamed verbatim.
    TarballFile,
    /// A package source directory, packed on request.
    Directory,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::TarballFile => write!(f, "tarball"),
            SourceKind::Directory => write!(f, "directory"),
        }
    }
}

/// One registered `(name, version)`.
#[derive(Clone, Debug)]
pub struct CatalogEntry {
    name: String,
    version: String,
    source: SourceKind,
    location: PathBuf,
    manifest: PackageManifest,
}

impl CatalogEntry {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        source: SourceKind,
        location: impl Into<PathBuf>,
        manifest: PackageManifest,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source,
            location: location.into(),
            manifest,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    /// File name used in the download path, `<unscoped-name>-<version>.tgz`.
    pub fn tarball_file_name(&self) -> String {
        let base = self
            .name
            .rsplit_once('/')
            .map_or(self.name.as_str(), |(_, base)| base);
        format!("{base}-{}.tgz", self.version)
    }
}

/// Package name to versions, each list kept in registration order.
#[derive(Default, Debug)]
pub struct Catalog {
    packages: HashMap<String, Vec<Arc<CatalogEntry>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry. An existing entry with the same version is replaced
    /// and the new one becomes the most recent registration.
    ///
    /// Returns the replaced entry, if any.
    pub fn insert(&mut self, entry: CatalogEntry) -> Option<Arc<CatalogEntry>> {
        let versions = self.packages.entry(entry.name.clone()).or_default();
        let replaced = versions
            .iter()
            .position(|existing| existing.version == entry.version)
            .map(|idx| versions.remove(idx));
        versions.push(Arc::new(entry));
        replaced
    }

    /// Versions of `name` in registration order.
    pub fn versions(&self, name: &str) -> Option<&[Arc<CatalogEntry>]> {
        self.packages
            .get(name)
            .map(Vec::as_slice)
            .filter(|v| !v.is_empty())
    }

    #[cfg(test)]
    fn get(&self, name: &str, version: &str) -> Option<Arc<CatalogEntry>> {
        self.versions(name)?
            .iter()
            .find(|entry| entry.version == version)
            .cloned()
    }

    /// Finds the entry whose download file name is `file`.
    pub fn find_by_file(&self, name: &str, file: &str) -> Option<Arc<CatalogEntry>> {
        self.versions(name)?
            .iter()
            .find(|entry| entry.tarball_file_name() == file)
            .cloned()
    }

    /// Picks the version `dist-tags.latest` points at.
    pub fn latest(&self, name: &str, policy: LatestPolicy) -> Option<Arc<CatalogEntry>> {
        let versions = self.versions(name)?;

        match policy {
            LatestPolicy::LastRegistered => versions.last().cloned(),
            LatestPolicy::Highest => highest_version(versions).or_else(|| versions.last().cloned()),
        }
    }

    pub fn package_count(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }
}

fn highest_version(versions: &[Arc<CatalogEntry>]) -> Option<Arc<CatalogEntry>> {
    let parsed: Vec<_> = versions
        .iter()
        .filter_map(|entry| {
            Version::parse(entry.version.trim_start_matches('v'))
                .ok()
                .map(|v| (v, entry))
        })
        .collect();

    let stable = parsed
        .iter()
        .filter(|(v, _)| v.pre.is_empty())
        .max_by(|(a, _), (b, _)| a.cmp(b));

    stable
        .or_else(|| parsed.iter().max_by(|(a, _), (b, _)| a.cmp(b)))
        .map(|(_, entry)| Arc::clone(entry))
}
