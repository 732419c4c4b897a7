use std::path::PathBuf;

use crate::transport::TransferRequest;

/// One file to fetch in the current cycle. `id` is the asset path (or a reserved
/// id such as `@manifest` for catalog files).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadUnit {
    pub id: String,
    pub source_url: String,
    pub storage_path: PathBuf,
    /// Size from the manifest, if it recorded one. Unsized units learn it from progress.
    pub expected_size: Option<u64>,
}

impl DownloadUnit {
    pub fn new(id: impl Into<String>, source_url: impl Into<String>, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            storage_path: storage_path.into(),
            expected_size: None,
        }
    }

    pub(crate) fn request(&self) -> TransferRequest {
        TransferRequest {
            id: self.id.clone(),
            url: self.source_url.clone(),
            destination: self.storage_path.clone(),
        }
    }
}
