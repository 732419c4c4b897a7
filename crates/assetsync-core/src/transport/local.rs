//! `file://` transport for local mirrors and offline packages.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use url::Url;

use super::throttle::ProgressThrottle;
use super::{
    finalize, partial_path, validate, TransferError, TransferHandle, TransferRequest, Transport,
    TransportEvent,
};

const CHUNK: usize = 64 * 1024;

/// Copies from `file://` URLs on a worker thread, reporting progress like a network transfer.
/// Query strings (e.g. cache-busting `?md5=`) are ignored.
#[derive(Debug, Clone)]
pub struct FileTransport {
    partial_suffix: String,
}

impl Default for FileTransport {
    fn default() -> Self {
        Self::new(".part")
    }
}

impl FileTransport {
    pub fn new(partial_suffix: impl Into<String>) -> Self {
        Self {
            partial_suffix: partial_suffix.into(),
        }
    }
}

fn source_path(url: &str) -> Result<PathBuf, TransferError> {
    let parsed =
        Url::parse(url).map_err(|e| TransferError::invalid_params(format!("{}: {}", url, e)))?;
    if parsed.scheme() != "file" {
        return Err(TransferError::invalid_params(format!(
            "unsupported scheme {} in {}",
            parsed.scheme(),
            url
        )));
    }
    parsed
        .to_file_path()
        .map_err(|_| TransferError::invalid_params(format!("not a local path: {}", url)))
}

fn copy(
    request: &TransferRequest,
    source: &Path,
    partial: &Path,
    sink: &Sender<TransportEvent>,
    abort: &AtomicBool,
) -> Result<(), TransferError> {
    let fail = |e: std::io::Error, what: &str| TransferError::file_op(&e, format!("{} {}", what, request.id));

    let mut src = File::open(source).map_err(|e| fail(e, "open source for"))?;
    let total = src.metadata().map(|m| m.len()).unwrap_or(0);
    if let Some(parent) = partial.parent() {
        fs::create_dir_all(parent).map_err(|e| fail(e, "create directory for"))?;
    }
    let mut dst = File::create(partial).map_err(|e| fail(e, "create partial for"))?;

    let mut buf = vec![0u8; CHUNK];
    let mut done = 0u64;
    let mut pending = 0u64;
    let mut throttle = ProgressThrottle::default();
    loop {
        if abort.load(Ordering::Relaxed) {
            drop(dst);
            let _ = fs::remove_file(partial);
            return Err(TransferError::aborted());
        }
        let n = src.read(&mut buf).map_err(|e| fail(e, "read"))?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n]).map_err(|e| fail(e, "write"))?;
        done += n as u64;
        pending += n as u64;
        if throttle.should_emit() {
            let _ = sink.send(TransportEvent::Progress {
                id: request.id.clone(),
                bytes_received: pending,
                total_received: done,
                total_expected: total,
            });
            pending = 0;
        }
    }
    if pending > 0 {
        let _ = sink.send(TransportEvent::Progress {
            id: request.id.clone(),
            bytes_received: pending,
            total_received: done,
            total_expected: total.max(done),
        });
    }
    dst.sync_all().map_err(|e| fail(e, "sync"))?;
    drop(dst);
    finalize(partial, &request.destination).map_err(|e| fail(e, "finalize"))
}

impl Transport for FileTransport {
    fn start(
        &self,
        request: TransferRequest,
        sink: Sender<TransportEvent>,
    ) -> Result<TransferHandle, TransferError> {
        validate(&request)?;
        let source = source_path(&request.url)?;
        let partial = partial_path(&request.destination, &self.partial_suffix);
        let handle = TransferHandle::new();
        let token = handle.token();
        std::thread::Builder::new()
            .name("assetsync-file".to_string())
            .spawn(move || {
                let id = request.id.clone();
                let event = match copy(&request, &source, &partial, &sink, &token) {
                    Ok(()) => TransportEvent::Succeeded { id },
                    Err(error) => {
                        tracing::debug!(id = %id, error = %error, "local copy failed");
                        TransportEvent::Failed { id, error }
                    }
                };
                let _ = sink.send(event);
            })
            .map_err(|e| TransferError::file_op(&e, "spawn copy thread"))?;
        Ok(handle)
    }
}
