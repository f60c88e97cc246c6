use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Component, Path},
};

use flate2::read::GzDecoder;
use tracing::trace;

use super::{is_gzip, Backend, MANIFEST_FILE};
use crate::{
    catalog::{CatalogEntry, SourceKind},
    error::{RegistryError, Result},
    manifest::PackageManifest,
    ErrorContext,
};

/// Accepts gzip compressed tar archives such as the output of `npm pack`.
///
/// The archive is streamed until the manifest is found; nothing is extracted
/// to disk. Downloads serve the original file so client integrity checks hold.
#[derive(Clone, Copy, Debug, Default)]
pub struct TarballBackend;

impl Backend for TarballBackend {
    fn name(&self) -> &'static str {
        "tarball"
    }

    fn try_register(&self, path: &Path) -> Result<Vec<CatalogEntry>> {
        if !path.is_file() || !is_gzip(path)? {
            return Ok(Vec::new());
        }

        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let manifest = read_manifest(BufReader::new(file))
            .map_err(|reason| RegistryError::unreadable(path, reason))?;

        let (name, version) = manifest.identity().ok_or_else(|| {
            RegistryError::unreadable(path, "package.json has no name or version")
        })?;

        trace!(name, version, path = %path.display(), "read tarball manifest");

        Ok(vec![CatalogEntry::new(
            name,
            version,
            SourceKind::TarballFile,
            path,
            manifest.clone(),
        )])
    }
}

/// Finds `<top-level-dir>/package.json` in a `.tgz` stream and parses it.
fn read_manifest<R: Read>(reader: R) -> std::result::Result<PackageManifest, String> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let entries = archive
        .entries()
        .map_err(|err| format!("not a tar archive: {err}"))?;

    for entry in entries {
        let mut entry = entry.map_err(|err| format!("corrupt archive: {err}"))?;
        let entry_path = entry
            .path()
            .map_err(|err| format!("invalid entry path: {err}"))?
            .into_owned();

        if !is_root_manifest(&entry_path) {
            continue;
        }

        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|err| format!("failed to read {MANIFEST_FILE}: {err}"))?;

        return PackageManifest::from_slice(&content)
            .map_err(|err| format!("invalid {MANIFEST_FILE}: {err}"));
    }

    Err(format!("archive does not contain {MANIFEST_FILE}"))
}

fn is_root_manifest(path: &Path) -> bool {
    let components: Vec<_> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    matches!(
        components.as_slice(),
        [Component::Normal(_), Component::Normal(file)] if *file == MANIFEST_FILE
    )
}
