//! Versioned asset catalog.
//!
//! A manifest lists every asset of a package by relative path together with
//! its md5, size and encoding, plus the URLs needed to fetch a newer catalog.
//! The engine keeps three of them: the installed one, the latest remote one,
//! and a temp ledger that records per-asset download state so an interrupted
//! update can resume.

mod asset;
mod diff;
mod persist;
mod version;

pub use asset::{is_contained_path, AssetKind, AssetRecord, DownloadState};
pub use diff::{diff_assets, summarize, AssetDiff, DiffKind, DiffMap};
pub use version::{default_compare, VersionComparator};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::scheduler::DownloadUnit;
use persist::ManifestDocument;

/// Bundled/installed catalog file name.
pub const MANIFEST_FILENAME: &str = "project.manifest";
/// Temp ledger file name inside the in-flight root.
pub const TEMP_MANIFEST_FILENAME: &str = "project.manifest.temp";
/// Lightweight version file name.
pub const VERSION_FILENAME: &str = "version.manifest";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest io {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error("manifest document is empty")]
    Empty,
    #[error("asset path {0:?} escapes the package root")]
    UnsafeAssetPath(String),
}

/// Join a package base URL and a relative asset path.
pub fn asset_url(package_url: &str, path: &str) -> String {
    if package_url.is_empty() || package_url.ends_with('/') || path.starts_with('/') {
        format!("{}{}", package_url, path)
    } else {
        format!("{}/{}", package_url, path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    version: String,
    package_url: String,
    remote_manifest_url: String,
    remote_version_url: String,
    updating: bool,
    assets: BTreeMap<String, AssetRecord>,
    /// Directory the asset paths are relative to.
    root: PathBuf,
    loaded: bool,
    version_loaded: bool,
}

impl Manifest {
    /// Empty, not-loaded manifest rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Parse a manifest file; the manifest root becomes the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let mut m = Self::default();
        m.parse_file(path)?;
        Ok(m)
    }

    pub fn parse_file(&mut self, path: &Path) -> Result<(), ManifestError> {
        if let Some(dir) = path.parent() {
            self.root = dir.to_path_buf();
        }
        let text = match persist::read(path) {
            Ok(t) => t,
            Err(e) => {
                self.clear();
                return Err(e);
            }
        };
        self.parse_str(&text)
    }

    /// Populate from a JSON document. On error the manifest is left cleared and not loaded.
    pub fn parse_str(&mut self, text: &str) -> Result<(), ManifestError> {
        self.clear();
        let doc = persist::decode(text)?;
        self.apply_header(&doc);
        self.updating = doc.updating;
        self.assets = doc.assets;
        self.loaded = true;
        self.version_loaded = true;
        tracing::debug!(
            version = %self.version,
            assets = self.assets.len(),
            root = %self.root.display(),
            "manifest parsed"
        );
        Ok(())
    }

    /// Load only the header fields (version and URLs) from a version file.
    pub fn parse_version_file(&mut self, path: &Path) -> Result<(), ManifestError> {
        self.clear();
        let doc = persist::decode(&persist::read(path)?)?;
        self.apply_header(&doc);
        self.version_loaded = true;
        Ok(())
    }

    fn apply_header(&mut self, doc: &ManifestDocument) {
        self.version = doc.version.clone();
        self.package_url = doc.package_url.clone();
        self.remote_manifest_url = doc.remote_manifest_url.clone();
        self.remote_version_url = doc.remote_version_url.clone();
    }

    /// Reset to the empty, not-loaded state (root is kept).
    pub fn clear(&mut self) {
        self.version.clear();
        self.package_url.clear();
        self.remote_manifest_url.clear();
        self.remote_version_url.clear();
        self.updating = false;
        self.assets.clear();
        self.loaded = false;
        self.version_loaded = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_version_loaded(&self) -> bool {
        self.version_loaded
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn package_url(&self) -> &str {
        &self.package_url
    }

    pub fn remote_manifest_url(&self) -> &str {
        &self.remote_manifest_url
    }

    pub fn remote_version_url(&self) -> &str {
        &self.remote_version_url
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.root = root.into();
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
        self.version_loaded = true;
    }

    pub fn set_package_url(&mut self, url: impl Into<String>) {
        self.package_url = url.into();
    }

    pub fn set_remote_manifest_url(&mut self, url: impl Into<String>) {
        self.remote_manifest_url = url.into();
    }

    pub fn set_remote_version_url(&mut self, url: impl Into<String>) {
        self.remote_version_url = url.into();
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    pub fn set_updating(&mut self, updating: bool) {
        self.updating = updating;
    }

    pub fn assets(&self) -> &BTreeMap<String, AssetRecord> {
        &self.assets
    }

    pub fn asset(&self, path: &str) -> Option<&AssetRecord> {
        self.assets.get(path)
    }

    /// Insert or replace a record; marks the manifest loaded. Paths that would
    /// resolve outside the manifest root are dropped.
    pub fn insert_asset(&mut self, mut record: AssetRecord) {
        record.path = record.path.trim_start_matches('/').to_string();
        if !is_contained_path(&record.path) {
            tracing::warn!(path = %record.path, "ignoring asset outside the package root");
            return;
        }
        self.assets.insert(record.path.clone(), record);
        self.loaded = true;
    }

    /// Compare this manifest's version with `other`'s.
    /// `cmp` overrides the default three-octet comparison entirely.
    pub fn version_compare(&self, other: &Manifest, cmp: Option<&VersionComparator>) -> Ordering {
        match cmp {
            Some(f) => f(&self.version, &other.version),
            None => default_compare(&self.version, &other.version),
        }
    }

    pub fn version_greater_or_equal(&self, other: &Manifest, cmp: Option<&VersionComparator>) -> bool {
        self.version_compare(other, cmp) != Ordering::Less
    }

    /// Exact string equality of versions (used to decide whether a temp ledger is resumable).
    pub fn version_equals(&self, other: &Manifest) -> bool {
        self.version == other.version
    }

    /// Changes needed to go from this catalog to `other`.
    pub fn diff(&self, other: &Manifest) -> DiffMap {
        diff_assets(&self.assets, &other.assets)
    }

    /// Record a download state, writing it back into the catalog. Returns false if the path is unknown.
    pub fn set_download_state(&mut self, path: &str, state: DownloadState) -> bool {
        match self.assets.get_mut(path) {
            Some(record) => {
                record.download_state = state;
                true
            }
            None => false,
        }
    }

    pub fn download_state(&self, path: &str) -> Option<DownloadState> {
        self.assets.get(path).map(|r| r.download_state)
    }

    /// Units for every asset that is neither Succeeded nor Unmarked, sourced from
    /// `package_url + path` and stored under this manifest's root. Does not mutate.
    pub fn gen_resume_list(&self) -> Vec<DownloadUnit> {
        self.assets
            .values()
            .filter(|r| r.is_pending())
            .map(|r| DownloadUnit {
                id: r.path.clone(),
                source_url: asset_url(&self.package_url, &r.path),
                storage_path: self.root.join(&r.path),
                expected_size: (r.size > 0).then_some(r.size),
            })
            .collect()
    }

    fn to_document(&self) -> ManifestDocument {
        ManifestDocument {
            version: self.version.clone(),
            package_url: self.package_url.clone(),
            remote_manifest_url: self.remote_manifest_url.clone(),
            remote_version_url: self.remote_version_url.clone(),
            updating: self.updating,
            assets: self.assets.clone(),
        }
    }

    /// Write the catalog to `path` via a sibling temp file and rename.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        persist::write_atomic(path, &self.to_document())?;
        tracing::debug!(path = %path.display(), version = %self.version, "manifest saved");
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }
}
