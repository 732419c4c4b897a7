//! Manifest JSON document and atomic save.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::asset::{is_contained_path, AssetRecord};
use super::ManifestError;

/// On-disk shape of `project.manifest` / `version.manifest`.
/// A version file is the same document without `assets`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ManifestDocument {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub package_url: String,
    #[serde(default)]
    pub remote_manifest_url: String,
    #[serde(default)]
    pub remote_version_url: String,
    #[serde(default)]
    pub updating: bool,
    #[serde(default)]
    pub assets: BTreeMap<String, AssetRecord>,
}

pub(super) fn decode(text: &str) -> Result<ManifestDocument, ManifestError> {
    if text.trim().is_empty() {
        return Err(ManifestError::Empty);
    }
    let mut doc: ManifestDocument = serde_json::from_str(text)?;
    if let Some(path) = doc.assets.keys().find(|p| !is_contained_path(p)) {
        return Err(ManifestError::UnsafeAssetPath(path.clone()));
    }
    for (path, record) in doc.assets.iter_mut() {
        record.path = path.clone();
    }
    Ok(doc)
}

pub(super) fn read(path: &Path) -> Result<String, ManifestError> {
    std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn sibling_temp(path: &Path) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(".saving");
    PathBuf::from(o)
}

/// Write `doc` next to `path` and rename it over the target (creates parent dir if needed).
pub(super) fn write_atomic(path: &Path, doc: &ManifestDocument) -> Result<(), ManifestError> {
    let io_err = |source: std::io::Error| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(doc)?;
    let tmp = sibling_temp(path);
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
