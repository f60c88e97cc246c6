use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, trace};

use super::{Backend, MANIFEST_FILE};
use crate::{
    catalog::{CatalogEntry, SourceKind},
    error::{RegistryError, Result},
    manifest::PackageManifest,
    ErrorContext,
};

/// Directories never searched for workspace members.
const SKIPPED_DIRS: [&str; 2] = ["node_modules", ".git"];

/// How deep below the root workspace members are searched for.
const MAX_WORKSPACE_DEPTH: usize = 4;

/// Accepts package source directories with a `package.json` at their root.
///
/// The directory is registered as-is; packing happens when the tarball is
/// requested. Members declared through `workspaces` are registered too.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectoryBackend;

impl Backend for DirectoryBackend {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn try_register(&self, path: &Path) -> Result<Vec<CatalogEntry>> {
        if !path.is_dir() || !path.join(MANIFEST_FILE).is_file() {
            return Ok(Vec::new());
        }

        let manifest = read_manifest(path)?;
        let patterns = manifest.workspace_patterns();
        let mut entries = Vec::new();

        match manifest.identity() {
            Some((name, version)) => {
                entries.push(CatalogEntry::new(
                    name,
                    version,
                    SourceKind::Directory,
                    path,
                    manifest.clone(),
                ));
            }
            None if !patterns.is_empty() => {
                debug!(path = %path.display(), "workspace root has no name or version, registering members only");
            }
            None => {
                return Err(RegistryError::unreadable(
                    path,
                    "package.json has no name or version",
                ));
            }
        }

        for member in find_workspace_members(path, &patterns)? {
            let member_manifest = read_manifest(&member)?;
            let (name, version) = member_manifest.identity().ok_or_else(|| {
                RegistryError::unreadable(&member, "package.json has no name or version")
            })?;

            trace!(name, version, path = %member.display(), "found workspace member");
            entries.push(CatalogEntry::new(
                name,
                version,
                SourceKind::Directory,
                &member,
                member_manifest.clone(),
            ));
        }

        Ok(entries)
    }
}

fn read_manifest(dir: &Path) -> Result<PackageManifest> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let content = fs::read(&manifest_path)
        .with_context(|| format!("reading {}", manifest_path.display()))?;

    PackageManifest::from_slice(&content)
        .map_err(|err| RegistryError::unreadable(dir, format!("invalid {MANIFEST_FILE}: {err}")))
}

/// Collects directories below `root` whose relative path matches one of
/// `patterns` and that contain a manifest. Sorted for a stable order.
fn find_workspace_members(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut members = Vec::new();
    if patterns.is_empty() {
        return Ok(members);
    }

    let mut pending = vec![(root.to_path_buf(), 0usize)];
    while let Some((dir, depth)) = pending.pop() {
        if depth >= MAX_WORKSPACE_DEPTH {
            continue;
        }

        let read_dir =
            fs::read_dir(&dir).with_context(|| format!("reading directory {}", dir.display()))?;

        for entry in read_dir {
            let entry =
                entry.with_context(|| format!("reading directory {}", dir.display()))?;
            let file_type = entry
                .file_type()
                .with_context(|| format!("inspecting {}", entry.path().display()))?;
            if !file_type.is_dir() {
                continue;
            }

            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if SKIPPED_DIRS.contains(&&*file_name) {
                continue;
            }

            let child = entry.path();
            let Ok(relative) = child.strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");

            if child.join(MANIFEST_FILE).is_file()
                && patterns
                    .iter()
                    .any(|pattern| fast_glob::glob_match(pattern, &relative))
            {
                members.push(child.clone());
            }

            pending.push((child, depth + 1));
        }
    }

    members.sort();
    Ok(members)
}
