//! Byte transport used by the scheduler.
//!
//! A transport starts one transfer per request and reports progress and the
//! outcome as owned [`TransportEvent`] messages on the channel it was given.
//! It never touches manifests. Two implementations ship here: [`HttpTransport`]
//! (libcurl, with HEAD-probed range resume) and [`FileTransport`] for `file://`
//! mirrors.

mod error;
mod http;
mod local;
mod probe;
mod throttle;

pub use error::{TransferError, TransferErrorCode};
pub use http::{HttpOptions, HttpTransport};
pub use local::FileTransport;
pub use probe::{probe, HeadResult};
pub use throttle::ProgressThrottle;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub id: String,
    pub url: String,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// `bytes_received` is the increment since the previous report for this id.
    Progress {
        id: String,
        bytes_received: u64,
        total_received: u64,
        total_expected: u64,
    },
    Succeeded {
        id: String,
    },
    Failed {
        id: String,
        error: TransferError,
    },
}

impl TransportEvent {
    pub fn id(&self) -> &str {
        match self {
            TransportEvent::Progress { id, .. }
            | TransportEvent::Succeeded { id }
            | TransportEvent::Failed { id, .. } => id,
        }
    }
}

/// Control side of a started transfer. Aborting is cooperative: the transport
/// checks the token between chunks and reports `Failed` with code `Abort`.
#[derive(Debug, Clone, Default)]
pub struct TransferHandle {
    abort: Arc<AtomicBool>,
}

impl TransferHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the transfer worker polls.
    pub fn token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }
}

pub trait Transport: Send + Sync {
    /// Begin fetching `request.url` into `request.destination`.
    ///
    /// Returns an error only when the request cannot be started at all; every
    /// started transfer ends with exactly one `Succeeded` or `Failed` on `sink`.
    fn start(
        &self,
        request: TransferRequest,
        sink: Sender<TransportEvent>,
    ) -> Result<TransferHandle, TransferError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn start(
        &self,
        request: TransferRequest,
        sink: Sender<TransportEvent>,
    ) -> Result<TransferHandle, TransferError> {
        (**self).start(request, sink)
    }
}

/// Partial-file path: appends `suffix` to the final path (`a.png` -> `a.png.part`).
pub fn partial_path(final_path: &Path, suffix: &str) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(suffix);
    PathBuf::from(o)
}

pub(crate) fn validate(request: &TransferRequest) -> Result<(), TransferError> {
    if request.url.trim().is_empty() {
        return Err(TransferError::invalid_params(format!(
            "empty url for {}",
            request.id
        )));
    }
    if request.destination.as_os_str().is_empty() || request.destination.file_name().is_none() {
        return Err(TransferError::invalid_params(format!(
            "invalid destination for {}",
            request.id
        )));
    }
    Ok(())
}

/// Move the finished partial file into place, creating parent directories.
pub(crate) fn finalize(partial: &Path, destination: &Path) -> std::io::Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(partial, destination)
}
