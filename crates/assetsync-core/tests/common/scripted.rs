//! Transport whose transfers are completed by the test.

use std::collections::BTreeMap;
use std::fs;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use assetsync_core::transport::{
    TransferError, TransferErrorCode, TransferHandle, TransferRequest, Transport, TransportEvent,
};

struct Open {
    request: TransferRequest,
    sink: Sender<TransportEvent>,
    handle: TransferHandle,
}

#[derive(Default)]
struct Inner {
    started: Vec<TransferRequest>,
    open: BTreeMap<String, Open>,
}

/// Records every started request and leaves it open until `succeed` or `fail`.
#[derive(Default)]
pub struct ScriptedTransport {
    inner: Mutex<Inner>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> Vec<TransferRequest> {
        self.inner.lock().unwrap().started.clone()
    }

    pub fn started_ids(&self) -> Vec<String> {
        self.started().into_iter().map(|r| r.id).collect()
    }

    /// Ids of transfers still running, sorted.
    pub fn open_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().open.keys().cloned().collect()
    }

    pub fn request(&self, id: &str) -> Option<TransferRequest> {
        self.inner
            .lock()
            .unwrap()
            .open
            .get(id)
            .map(|o| o.request.clone())
    }

    pub fn was_aborted(&self, id: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .open
            .get(id)
            .map(|o| o.handle.is_aborted())
            .unwrap_or(false)
    }

    /// Write `body` to the destination and report success.
    pub fn succeed(&self, id: &str, body: &[u8]) {
        let open = self.take(id);
        if let Some(parent) = open.request.destination.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&open.request.destination, body).unwrap();
        let len = body.len() as u64;
        let _ = open.sink.send(TransportEvent::Progress {
            id: id.to_string(),
            bytes_received: len,
            total_received: len,
            total_expected: len,
        });
        let _ = open.sink.send(TransportEvent::Succeeded { id: id.to_string() });
    }

    pub fn fail(&self, id: &str, status: i64) {
        let open = self.take(id);
        let _ = open.sink.send(TransportEvent::Failed {
            id: id.to_string(),
            error: TransferError::new(
                TransferErrorCode::ImplInternal,
                status,
                format!("HTTP {}", status),
            ),
        });
    }

    /// Report the terminal event of an aborted transfer.
    pub fn settle_aborted(&self, id: &str) {
        let open = self.take(id);
        let _ = open.sink.send(TransportEvent::Failed {
            id: id.to_string(),
            error: TransferError::aborted(),
        });
    }

    fn take(&self, id: &str) -> Open {
        self.inner
            .lock()
            .unwrap()
            .open
            .remove(id)
            .unwrap_or_else(|| panic!("no open transfer {}", id))
    }
}

impl Transport for ScriptedTransport {
    fn start(
        &self,
        request: TransferRequest,
        sink: Sender<TransportEvent>,
    ) -> Result<TransferHandle, TransferError> {
        let handle = TransferHandle::new();
        let mut inner = self.inner.lock().unwrap();
        inner.started.push(request.clone());
        inner.open.insert(
            request.id.clone(),
            Open {
                request,
                sink,
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }
}
