//! Asset records: one catalog entry per relative path.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

/// True if joining `path` onto a root names a file strictly inside that root:
/// no root or drive prefix, no `..`, and at least one normal component.
pub fn is_contained_path(path: &str) -> bool {
    let mut named = false;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => named = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    named
}

/// Content encoding of an asset, stored as the integer `type` flag in manifest JSON.
///
/// Flag values outside the known set (combinations such as `3`, or `8` for
/// "unknown") are kept verbatim in [`AssetKind::Other`] and written back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i16", into = "i16")]
pub enum AssetKind {
    #[default]
    Normal,
    /// Gzip stream; decompressed in place after the transfer is verified.
    GZip,
    Archive,
    Encrypted,
    Other(i16),
}

impl From<i16> for AssetKind {
    fn from(v: i16) -> Self {
        match v {
            0 => AssetKind::Normal,
            1 => AssetKind::GZip,
            2 => AssetKind::Archive,
            4 => AssetKind::Encrypted,
            other => AssetKind::Other(other),
        }
    }
}

impl From<AssetKind> for i16 {
    fn from(k: AssetKind) -> i16 {
        match k {
            AssetKind::Normal => 0,
            AssetKind::GZip => 1,
            AssetKind::Archive => 2,
            AssetKind::Encrypted => 4,
            AssetKind::Other(v) => v,
        }
    }
}

/// Per-asset download state recorded in the temp ledger.
///
/// Within one cycle a record only moves Unstarted -> Downloading -> Succeeded,
/// or back to Unstarted when the transfer fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DownloadState {
    #[default]
    Unstarted,
    Downloading,
    Succeeded,
    /// Excluded from the current cycle; never resumed.
    Unmarked,
}

impl TryFrom<u8> for DownloadState {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(DownloadState::Unstarted),
            1 => Ok(DownloadState::Downloading),
            2 => Ok(DownloadState::Succeeded),
            3 => Ok(DownloadState::Unmarked),
            other => Err(format!("unknown download state {}", other)),
        }
    }
}

impl From<DownloadState> for u8 {
    fn from(s: DownloadState) -> u8 {
        match s {
            DownloadState::Unstarted => 0,
            DownloadState::Downloading => 1,
            DownloadState::Succeeded => 2,
            DownloadState::Unmarked => 3,
        }
    }
}

/// One catalog entry. `path` is the map key in the document and is filled in on parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    #[serde(skip)]
    pub path: String,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default)]
    pub kind: AssetKind,
    #[serde(rename = "downloadState", default)]
    pub download_state: DownloadState,
}

impl AssetRecord {
    pub fn new(path: impl Into<String>, md5: impl Into<String>, size: u64, kind: AssetKind) -> Self {
        Self {
            path: path.into(),
            md5: md5.into(),
            size,
            kind,
            download_state: DownloadState::Unstarted,
        }
    }

    /// True when the ledger still needs this asset fetched.
    pub fn is_pending(&self) -> bool {
        !matches!(
            self.download_state,
            DownloadState::Succeeded | DownloadState::Unmarked
        )
    }
}
