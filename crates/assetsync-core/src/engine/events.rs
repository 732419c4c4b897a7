//! Lifecycle events delivered to the engine's subscriber.

use serde::Serialize;

/// Point-in-time progress of the running batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Byte percent; `None` until every unit's size is known.
    pub percent: Option<f64>,
    /// `100 * settled / total`, integer division.
    pub percent_by_file: u32,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub downloaded_files: usize,
    pub total_files: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    NoLocalManifest,
    ManifestDownloadError {
        message: String,
    },
    ManifestParseError {
        message: String,
    },
    NewVersionFound {
        local_version: String,
        remote_version: String,
    },
    AlreadyUpToDate,
    UpdateProgress {
        progress: ProgressSnapshot,
    },
    AssetUpdated {
        asset_id: String,
    },
    AssetUpdateError {
        asset_id: String,
        message: String,
        error_code: i32,
        inner_error_code: i64,
    },
    UpdateFinished {
        version: String,
    },
    UpdateFailed {
        failed: usize,
        message: String,
    },
    DecompressError {
        asset_id: String,
        message: String,
    },
}

impl SyncEvent {
    pub fn asset_id(&self) -> Option<&str> {
        match self {
            SyncEvent::AssetUpdated { asset_id }
            | SyncEvent::AssetUpdateError { asset_id, .. }
            | SyncEvent::DecompressError { asset_id, .. } => Some(asset_id),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            SyncEvent::ManifestDownloadError { message }
            | SyncEvent::ManifestParseError { message }
            | SyncEvent::AssetUpdateError { message, .. }
            | SyncEvent::UpdateFailed { message, .. }
            | SyncEvent::DecompressError { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<i32> {
        match self {
            SyncEvent::AssetUpdateError { error_code, .. } => Some(*error_code),
            _ => None,
        }
    }

    pub fn inner_error_code(&self) -> Option<i64> {
        match self {
            SyncEvent::AssetUpdateError {
                inner_error_code, ..
            } => Some(*inner_error_code),
            _ => None,
        }
    }

    /// Events that end the caller's current intent.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncEvent::NoLocalManifest
                | SyncEvent::ManifestDownloadError { .. }
                | SyncEvent::ManifestParseError { .. }
                | SyncEvent::AlreadyUpToDate
                | SyncEvent::UpdateFinished { .. }
                | SyncEvent::UpdateFailed { .. }
        )
    }
}
