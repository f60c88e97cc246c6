//! The package registry: backends, catalog and lookups.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use offreg_config::config::LatestPolicy;
use tracing::{debug, info, trace};

use crate::{
    backend::Backend,
    catalog::{Catalog, CatalogEntry, SourceKind},
    error::{RegistryError, Result},
    metadata::PackageMetadata,
    stream::TarballStream,
};

/// Source of the base URL used in `dist.tarball` links.
pub trait UrlProvider: Send + Sync {
    /// Root URL of the running service, `None` while it is not bound.
    fn base_url(&self) -> Option<String>;
}

impl UrlProvider for String {
    fn base_url(&self) -> Option<String> {
        Some(self.clone())
    }
}

pub struct Registry {
    backends: Vec<Arc<dyn Backend>>,
    catalog: RwLock<Catalog>,
    latest_policy: LatestPolicy,
    provider: RwLock<Option<Arc<dyn UrlProvider>>>,
}

impl Registry {
    pub fn new(latest_policy: LatestPolicy) -> Self {
        Self {
            backends: Vec::new(),
            catalog: RwLock::new(Catalog::new()),
            latest_policy,
            provider: RwLock::new(None),
        }
    }

    /// Appends a backend. Earlier backends take precedence.
    pub fn add_backend(&mut self, backend: Arc<dyn Backend>) {
        debug!(backend = backend.name(), "added backend");
        self.backends.push(backend);
    }

    pub fn set_service_provider(&self, provider: Arc<dyn UrlProvider>) {
        *self.provider.write().unwrap_or_else(PoisonError::into_inner) = Some(provider);
    }

    /// Offers `path` to the backends and adds whatever the first accepting
    /// backend returns.
    ///
    /// Resolves to the number of registered entries, 0 when no backend wanted
    /// the path.
    pub async fn register(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref().to_path_buf();
        let backends = self.backends.clone();

        let task_path = path.clone();
        let accepted = tokio::task::spawn_blocking(move || inspect(&backends, &task_path))
            .await
            .map_err(|err| RegistryError::Task(err.to_string()))??;

        let Some((backend, entries)) = accepted else {
            trace!(path = %path.display(), "no backend accepted path");
            return Ok(0);
        };

        let count = entries.len();
        let mut catalog = self.catalog_mut();
        for entry in entries {
            debug!(
                backend,
                source = %entry.location().display(),
                "registered {}@{}",
                entry.name(),
                entry.version()
            );
            if let Some(previous) = catalog.insert(entry) {
                info!(
                    "{}@{} registered again, replacing {}",
                    previous.name(),
                    previous.version(),
                    previous.location().display()
                );
            }
        }

        Ok(count)
    }

    /// Builds the packument for `name`.
    pub fn lookup_package_metadata(&self, name: &str) -> Result<PackageMetadata> {
        let base_url = self
            .provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|provider| provider.base_url())
            .ok_or(RegistryError::ServiceUnavailable)?;

        let catalog = self.catalog();
        let versions = catalog
            .versions(name)
            .ok_or_else(|| RegistryError::not_found(name))?;
        let latest = catalog
            .latest(name, self.latest_policy)
            .ok_or_else(|| RegistryError::not_found(name))?;

        Ok(PackageMetadata::build(
            name,
            versions.iter().map(|entry| &**entry),
            &latest,
            &base_url,
        ))
    }

    /// Opens a byte stream for the download `file` of package `name`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn get_tarball_stream(&self, name: &str, file: &str) -> Result<TarballStream> {
        let entry = self
            .catalog()
            .find_by_file(name, file)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
                file: Some(file.to_string()),
            })?;

        match entry.source() {
            SourceKind::TarballFile => {
                TarballStream::from_file(entry.location()).map_err(|source| {
                    RegistryError::StreamFailure {
                        name: name.to_string(),
                        file: file.to_string(),
                        source,
                    }
                })
            }
            SourceKind::Directory => Ok(TarballStream::from_directory(PathBuf::from(
                entry.location(),
            ))),
        }
    }

    /// Total number of registered `(name, version)` pairs.
    pub fn package_count(&self) -> usize {
        self.catalog().package_count()
    }

    #[cfg(test)]
    fn entries(&self, name: &str) -> Vec<Arc<CatalogEntry>> {
        self.catalog()
            .versions(name)
            .map(<[_]>::to_vec)
            .unwrap_or_default()
    }

    fn catalog(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn catalog_mut(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn inspect(
    backends: &[Arc<dyn Backend>],
    path: &Path,
) -> Result<Option<(&'static str, Vec<CatalogEntry>)>> {
    for backend in backends {
        let entries = backend.try_register(path)?;
        if !entries.is_empty() {
            return Ok(Some((backend.name(), entries)));
        }
    }
    Ok(None)
}
