//! Update lifecycle states and caller intents.

use std::fmt;

/// Engine state. Variants are declared in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncState {
    /// No usable local manifest was found.
    Uninitialized,
    Unchecked,
    PredownloadVersion,
    DownloadingVersion,
    VersionLoaded,
    PredownloadManifest,
    DownloadingManifest,
    ManifestLoaded,
    NeedUpdate,
    ReadyToUpdate,
    Updating,
    /// Transfers are drained; gzip assets are still being inflated.
    Unzipping,
    UpToDate,
    FailToUpdate,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Uninitialized => "uninitialized",
            SyncState::Unchecked => "unchecked",
            SyncState::PredownloadVersion => "predownload-version",
            SyncState::DownloadingVersion => "downloading-version",
            SyncState::VersionLoaded => "version-loaded",
            SyncState::PredownloadManifest => "predownload-manifest",
            SyncState::DownloadingManifest => "downloading-manifest",
            SyncState::ManifestLoaded => "manifest-loaded",
            SyncState::NeedUpdate => "need-update",
            SyncState::ReadyToUpdate => "ready-to-update",
            SyncState::Updating => "updating",
            SyncState::Unzipping => "unzipping",
            SyncState::UpToDate => "up-to-date",
            SyncState::FailToUpdate => "fail-to-update",
        }
    }

    /// Asset transfers or decompressions belong to the current cycle.
    pub fn is_updating(self) -> bool {
        matches!(self, SyncState::Updating | SyncState::Unzipping)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller asked for. At most one is outstanding at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateIntent {
    /// Find out whether a newer version exists; never downloads assets.
    CheckUpdate,
    /// Drive the cycle through commit.
    DoUpdate,
}
