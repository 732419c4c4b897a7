//! libcurl transport: one worker thread per transfer.
//!
//! Bytes go to `<destination><partial_suffix>` and are renamed into place once
//! the response completes. When resume is allowed and a partial file exists,
//! a HEAD probe decides whether to continue it with `Range: bytes=N-`.

use std::cell::{Cell, RefCell};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SyncConfig;
use crate::retry::{run_with_retry, AttemptError, RetryPolicy};

use super::probe::probe;
use super::throttle::ProgressThrottle;
use super::{
    finalize, partial_path, validate, TransferError, TransferHandle, TransferRequest, Transport,
    TransportEvent,
};

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub allow_resume: bool,
    pub partial_suffix: String,
    pub retry: RetryPolicy,
    /// Minimum spacing of progress events per transfer.
    pub progress_interval: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(3600),
            allow_resume: true,
            partial_suffix: ".part".to_string(),
            retry: RetryPolicy::default(),
            progress_interval: Duration::from_millis(100),
        }
    }
}

impl HttpOptions {
    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs.max(1)),
            timeout: Duration::from_secs(cfg.transfer_timeout_secs.max(1)),
            allow_resume: cfg.allow_resume,
            partial_suffix: cfg.transfer_temp_suffix.clone(),
            retry: cfg.retry_policy(),
            progress_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    options: Arc<HttpOptions>,
}

impl HttpTransport {
    pub fn new(options: HttpOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }
}

impl Transport for HttpTransport {
    fn start(
        &self,
        request: TransferRequest,
        sink: Sender<TransportEvent>,
    ) -> Result<TransferHandle, TransferError> {
        validate(&request)?;
        let handle = TransferHandle::new();
        let token = handle.token();
        let options = Arc::clone(&self.options);
        std::thread::Builder::new()
            .name("assetsync-http".to_string())
            .spawn(move || {
                let id = request.id.clone();
                let event = match fetch(&request, &options, &sink, &token) {
                    Ok(()) => {
                        tracing::debug!(id = %id, url = %request.url, "transfer complete");
                        TransportEvent::Succeeded { id }
                    }
                    Err(e) => {
                        tracing::debug!(id = %id, url = %request.url, error = %e, "transfer failed");
                        TransportEvent::Failed {
                            id,
                            error: e.into(),
                        }
                    }
                };
                let _ = sink.send(event);
            })
            .map_err(|e| TransferError::file_op(&e, "spawn transfer thread"))?;
        Ok(handle)
    }
}

fn existing_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn fetch(
    req: &TransferRequest,
    opts: &HttpOptions,
    sink: &Sender<TransportEvent>,
    abort: &AtomicBool,
) -> Result<(), AttemptError> {
    let partial = partial_path(&req.destination, &opts.partial_suffix);
    if let Some(parent) = partial.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut resumable = false;
    let have = existing_len(&partial);
    if opts.allow_resume && have > 0 {
        match probe(&req.url, opts.connect_timeout) {
            Ok(head) if head.accept_ranges => match head.content_length {
                Some(len) if have == len => {
                    finalize(&partial, &req.destination)?;
                    let _ = sink.send(TransportEvent::Progress {
                        id: req.id.clone(),
                        bytes_received: len,
                        total_received: len,
                        total_expected: len,
                    });
                    tracing::debug!(id = %req.id, bytes = len, "partial file already complete");
                    return Ok(());
                }
                Some(len) if have > len => fs::remove_file(&partial)?,
                Some(_) => resumable = true,
                None => {}
            },
            Ok(_) => {}
            Err(e) => tracing::debug!(id = %req.id, error = %e, "HEAD probe failed; restarting transfer"),
        }
    }
    if resumable {
        tracing::debug!(id = %req.id, offset = have, "resuming partial transfer");
    }

    run_with_retry(&opts.retry, abort, |_| {
        get_once(req, &partial, opts, sink, abort, resumable)
    })
}

fn parse_status_line(line: &str) -> Option<u32> {
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

fn get_once(
    req: &TransferRequest,
    partial: &Path,
    opts: &HttpOptions,
    sink: &Sender<TransportEvent>,
    abort: &AtomicBool,
    resume: bool,
) -> Result<(), AttemptError> {
    let offset = if resume { existing_len(partial) } else { 0 };
    let file = if offset > 0 {
        OpenOptions::new().append(true).open(partial)?
    } else {
        File::create(partial)?
    };
    let file = RefCell::new(file);
    let status = Cell::new(0u32);
    let base = Cell::new(offset);
    let first_chunk = Cell::new(true);
    let written = Cell::new(0u64);
    let reported = Cell::new(offset);
    let write_err: RefCell<Option<std::io::Error>> = RefCell::new(None);
    let mut throttle = ProgressThrottle::new(opts.progress_interval);

    let report = |total_received: u64, total_expected: u64| {
        let delta = total_received.saturating_sub(reported.get());
        if delta == 0 {
            return;
        }
        reported.set(total_received);
        let _ = sink.send(TransportEvent::Progress {
            id: req.id.clone(),
            bytes_received: delta,
            total_received,
            total_expected,
        });
    };

    let mut easy = curl::easy::Easy::new();
    easy.url(&req.url).map_err(AttemptError::Curl)?;
    easy.follow_location(true).map_err(AttemptError::Curl)?;
    easy.max_redirections(10).map_err(AttemptError::Curl)?;
    easy.connect_timeout(opts.connect_timeout).map_err(AttemptError::Curl)?;
    easy.low_speed_limit(1024).map_err(AttemptError::Curl)?;
    easy.low_speed_time(Duration::from_secs(60)).map_err(AttemptError::Curl)?;
    easy.timeout(opts.timeout).map_err(AttemptError::Curl)?;
    easy.progress(true).map_err(AttemptError::Curl)?;
    if offset > 0 {
        easy.resume_from(offset).map_err(AttemptError::Curl)?;
    }

    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Some(code) = str::from_utf8(data).ok().and_then(parse_status_line) {
                    status.set(code);
                }
                true
            })
            .map_err(AttemptError::Curl)?;
        transfer
            .write_function(|data| {
                if abort.load(Ordering::Relaxed) {
                    return Ok(0);
                }
                let mut f = file.borrow_mut();
                if first_chunk.replace(false) && base.get() > 0 && status.get() == 200 {
                    // Range ignored: the body starts from byte 0.
                    if let Err(e) = f.set_len(0) {
                        *write_err.borrow_mut() = Some(e);
                        return Ok(0);
                    }
                    base.set(0);
                    reported.set(0);
                }
                match f.write_all(data) {
                    Ok(()) => {
                        written.set(written.get() + data.len() as u64);
                        Ok(data.len())
                    }
                    Err(e) => {
                        *write_err.borrow_mut() = Some(e);
                        Ok(0)
                    }
                }
            })
            .map_err(AttemptError::Curl)?;
        transfer
            .progress_function(|dltotal, dlnow, _, _| {
                if abort.load(Ordering::Relaxed) {
                    return false;
                }
                if dlnow > 0.0 && throttle.should_emit() {
                    let expected = if dltotal > 0.0 {
                        base.get() + dltotal as u64
                    } else {
                        0
                    };
                    report(base.get() + dlnow as u64, expected);
                }
                true
            })
            .map_err(AttemptError::Curl)?;
        transfer.perform()
    };

    if let Some(e) = write_err.borrow_mut().take() {
        return Err(AttemptError::Storage(e));
    }
    if abort.load(Ordering::Relaxed) {
        return Err(AttemptError::Aborted);
    }
    performed.map_err(AttemptError::Curl)?;

    let code = easy.response_code().map_err(AttemptError::Curl)?;
    if code == 416 && offset > 0 {
        // Partial is not a prefix of the current body; next attempt starts over.
        fs::remove_file(partial)?;
        return Err(AttemptError::PartialTransfer {
            expected: 0,
            received: offset,
        });
    }
    if !(200..300).contains(&code) {
        return Err(AttemptError::Http(code));
    }
    let advertised = easy.content_length_download().map_err(AttemptError::Curl)?;
    if advertised >= 0.0 && written.get() < advertised as u64 {
        return Err(AttemptError::PartialTransfer {
            expected: advertised as u64,
            received: written.get(),
        });
    }

    file.into_inner().sync_all()?;
    let total = base.get() + written.get();
    report(total, total);
    finalize(partial, &req.destination)?;
    Ok(())
}
