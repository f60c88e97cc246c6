//! Packument documents served to npm clients.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::CatalogEntry;

/// Manifest keys the registry always writes itself.
const RESERVED_KEYS: [&str; 4] = ["_id", "name", "version", "dist"];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Dist {
    pub tarball: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DistTags {
    pub latest: String,
}

/// Metadata for one version: the package's manifest plus registry fields.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VersionMetadata {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub version: String,
    pub dist: Dist,
    #[serde(flatten)]
    pub manifest: Map<String, Value>,
}

impl VersionMetadata {
    pub fn from_entry(entry: &CatalogEntry, base_url: &str) -> Self {
        let mut manifest = entry.manifest().document().clone();
        for key in RESERVED_KEYS {
            manifest.remove(key);
        }

        Self {
            id: format!("{}@{}", entry.name(), entry.version()),
            name: entry.name().to_string(),
            version: entry.version().to_string(),
            dist: Dist {
                tarball: tarball_url(base_url, entry),
            },
            manifest,
        }
    }
}

/// The document answered for `GET /<name>`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PackageMetadata {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "dist-tags")]
    pub dist_tags: DistTags,
    pub versions: BTreeMap<String, VersionMetadata>,
}

impl PackageMetadata {
    /// Builds the packument for `name` from its entries and the chosen latest
    /// entry. `base_url` is the service root, with or without trailing slash.
    pub fn build<'a, I>(name: &str, entries: I, latest: &CatalogEntry, base_url: &str) -> Self
    where
        I: IntoIterator<Item = &'a CatalogEntry>,
    {
        let versions = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.version().to_string(),
                    VersionMetadata::from_entry(entry, base_url),
                )
            })
            .collect();

        Self {
            id: name.to_string(),
            name: name.to_string(),
            dist_tags: DistTags {
                latest: latest.version().to_string(),
            },
            versions,
        }
    }
}

/// `<base>/<name>/-/<unscoped-name>-<version>.tgz`; scoped names keep their
/// raw `@scope/name` form in the path.
pub fn tarball_url(base_url: &str, entry: &CatalogEntry) -> String {
    format!(
        "{}/{}/-/{}",
        base_url.trim_end_matches('/'),
        entry.name(),
        entry.tarball_file_name()
    )
}
