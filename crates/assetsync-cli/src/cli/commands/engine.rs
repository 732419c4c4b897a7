//! Engine construction shared by `check` and `update`.

use anyhow::Result;
use assetsync_core::config::SyncConfig;
use assetsync_core::engine::{EngineOptions, SyncEngine};
use assetsync_core::transport::{
    FileTransport, HttpOptions, HttpTransport, TransferError, TransferHandle, TransferRequest,
    Transport, TransportEvent,
};
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Sends `file://` URLs to the local copier and everything else to libcurl.
struct SchemeTransport {
    http: HttpTransport,
    file: FileTransport,
}

impl Transport for SchemeTransport {
    fn start(
        &self,
        request: TransferRequest,
        sink: Sender<TransportEvent>,
    ) -> Result<TransferHandle, TransferError> {
        if request.url.starts_with("file:") {
            self.file.start(request, sink)
        } else {
            self.http.start(request, sink)
        }
    }
}

pub(super) fn open_engine(cfg: &SyncConfig, manifest: &Path, storage: &Path) -> Result<SyncEngine> {
    let transport = SchemeTransport {
        http: HttpTransport::new(HttpOptions::from_config(cfg)),
        file: FileTransport::new(cfg.transfer_temp_suffix.clone()),
    };
    let options = EngineOptions::from_config(cfg, manifest, storage);
    SyncEngine::new(options, Arc::new(transport))
}
