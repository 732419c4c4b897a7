//! Storage root and its in-flight sibling.

use std::path::{Path, PathBuf};

use crate::manifest::{MANIFEST_FILENAME, TEMP_MANIFEST_FILENAME, VERSION_FILENAME};

/// `storage_root` holds installed assets and the cached manifest. Everything of
/// an unfinished update lives under `temp_root`, named after the storage root
/// plus the temp suffix (`assets` -> `assets_temp`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    storage_root: PathBuf,
    temp_root: PathBuf,
}

impl StorageLayout {
    pub fn new(storage_root: impl Into<PathBuf>, temp_suffix: &str) -> Self {
        let storage_root = storage_root.into();
        let name = storage_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "storage".to_string());
        let temp_name = format!("{}{}", name, temp_suffix);
        let temp_root = match storage_root.parent() {
            Some(parent) if storage_root.file_name().is_some() => parent.join(temp_name),
            _ => storage_root.join(temp_name),
        };
        Self {
            storage_root,
            temp_root,
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Manifest of the last committed update.
    pub fn cached_manifest(&self) -> PathBuf {
        self.storage_root.join(MANIFEST_FILENAME)
    }

    /// Temp ledger of the in-flight update.
    pub fn temp_manifest(&self) -> PathBuf {
        self.temp_root.join(TEMP_MANIFEST_FILENAME)
    }

    /// Where the downloaded remote manifest lands. Commit renames the ledger over it.
    pub fn temp_remote_manifest(&self) -> PathBuf {
        self.temp_root.join(MANIFEST_FILENAME)
    }

    pub fn temp_version(&self) -> PathBuf {
        self.temp_root.join(VERSION_FILENAME)
    }

    pub fn temp_asset(&self, path: &str) -> PathBuf {
        self.temp_root.join(path)
    }

    pub fn installed_asset(&self, path: &str) -> PathBuf {
        self.storage_root.join(path)
    }
}
