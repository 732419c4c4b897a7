//! Bounded pool of concurrent transfers.
//!
//! Units wait in a FIFO pending queue and move into the active set while it
//! holds fewer than `max_concurrent` transfers. Transport events arrive on an
//! mpsc channel and are drained by [`DownloadScheduler::poll`]; every completion
//! frees a slot that is refilled in the same poll.
//!
//! Aborted transfers stay tracked until their terminal event arrives, and a unit
//! with the same id is not restarted before that, so two transfers never write
//! the same partial file.

mod unit;

pub use unit::DownloadUnit;

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::transport::{TransferError, TransferHandle, Transport, TransportEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Progress {
        id: String,
        bytes_received: u64,
        total_received: u64,
        total_expected: u64,
    },
    /// `error` is `None` on success.
    Finished {
        unit: DownloadUnit,
        error: Option<TransferError>,
    },
}

struct ActiveTransfer {
    unit: DownloadUnit,
    handle: TransferHandle,
}

pub struct DownloadScheduler {
    transport: Arc<dyn Transport>,
    max_concurrent: usize,
    pending: VecDeque<DownloadUnit>,
    active: HashMap<String, ActiveTransfer>,
    /// Aborted transfers whose terminal event has not arrived yet.
    aborting: HashMap<String, TransferHandle>,
    /// Completions produced without a transport event (start failures).
    ready: VecDeque<SchedulerEvent>,
    tx: Sender<TransportEvent>,
    rx: Receiver<TransportEvent>,
    paused: bool,
    peak_active: usize,
}

impl DownloadScheduler {
    pub fn new(transport: Arc<dyn Transport>, max_concurrent: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            transport,
            max_concurrent: max_concurrent.max(1),
            pending: VecDeque::new(),
            active: HashMap::new(),
            aborting: HashMap::new(),
            ready: VecDeque::new(),
            tx,
            rx,
            paused: false,
            peak_active: 0,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Change the concurrency bound. Raising it starts waiting units right away;
    /// lowering it lets running transfers finish.
    pub fn set_max_concurrent(&mut self, max: usize) {
        self.max_concurrent = max.max(1);
        self.refill();
    }

    fn is_live(&self, id: &str) -> bool {
        self.active.contains_key(id) || self.pending.iter().any(|u| u.id == id)
    }

    /// Queue units and start as many as the bound allows. Units whose id is
    /// already pending or active are refused. Returns the number accepted.
    pub fn enqueue(&mut self, units: impl IntoIterator<Item = DownloadUnit>) -> usize {
        let mut accepted = 0;
        for unit in units {
            if self.is_live(&unit.id) {
                tracing::warn!(id = %unit.id, "unit already scheduled; refusing duplicate");
                continue;
            }
            self.pending.push_back(unit);
            accepted += 1;
        }
        tracing::debug!(
            accepted,
            pending = self.pending.len(),
            active = self.active.len(),
            "units enqueued"
        );
        self.refill();
        accepted
    }

    fn next_startable(&mut self) -> Option<DownloadUnit> {
        let pos = self
            .pending
            .iter()
            .position(|u| !self.aborting.contains_key(&u.id))?;
        self.pending.remove(pos)
    }

    fn refill(&mut self) {
        if self.paused {
            return;
        }
        while self.active.len() < self.max_concurrent {
            let Some(unit) = self.next_startable() else {
                break;
            };
            match self.transport.start(unit.request(), self.tx.clone()) {
                Ok(handle) => {
                    tracing::debug!(id = %unit.id, url = %unit.source_url, "transfer started");
                    self.active.insert(unit.id.clone(), ActiveTransfer { unit, handle });
                    self.peak_active = self.peak_active.max(self.active.len());
                }
                Err(error) => {
                    tracing::warn!(id = %unit.id, error = %error, "transfer could not start");
                    self.ready.push_back(SchedulerEvent::Finished {
                        unit,
                        error: Some(error),
                    });
                }
            }
        }
    }

    /// Drain transport events, refill freed slots, and return what happened.
    /// Returns nothing while paused; events stay buffered until `resume`.
    pub fn poll(&mut self) -> Vec<SchedulerEvent> {
        if self.paused {
            return Vec::new();
        }
        let mut out: Vec<SchedulerEvent> = self.ready.drain(..).collect();
        while let Ok(event) = self.rx.try_recv() {
            match event {
                TransportEvent::Progress {
                    id,
                    bytes_received,
                    total_received,
                    total_expected,
                } => {
                    if self.active.contains_key(&id) {
                        out.push(SchedulerEvent::Progress {
                            id,
                            bytes_received,
                            total_received,
                            total_expected,
                        });
                    }
                }
                TransportEvent::Succeeded { id } => self.complete(id, None, &mut out),
                TransportEvent::Failed { id, error } => self.complete(id, Some(error), &mut out),
            }
        }
        out.extend(self.ready.drain(..));
        out
    }

    fn complete(&mut self, id: String, error: Option<TransferError>, out: &mut Vec<SchedulerEvent>) {
        if self.aborting.remove(&id).is_some() {
            tracing::debug!(id = %id, "aborted transfer settled");
            self.refill();
            return;
        }
        let Some(done) = self.active.remove(&id) else {
            return;
        };
        out.push(SchedulerEvent::Finished {
            unit: done.unit,
            error,
        });
        self.refill();
    }

    /// Abort one unit. A pending unit is dropped; an active one has its token
    /// raised and produces no further events. Returns the unit if it was live.
    pub fn abort(&mut self, id: &str) -> Option<DownloadUnit> {
        if let Some(pos) = self.pending.iter().position(|u| u.id == id) {
            return self.pending.remove(pos);
        }
        let active = self.active.remove(id)?;
        active.handle.abort();
        self.aborting.insert(active.unit.id.clone(), active.handle);
        tracing::debug!(id, "transfer aborted");
        self.refill();
        Some(active.unit)
    }

    /// Abort everything and drop the queue. Afterwards no unit is active or pending.
    pub fn stop(&mut self) {
        self.pending.clear();
        self.ready.clear();
        for (id, active) in self.active.drain() {
            active.handle.abort();
            self.aborting.insert(id, active.handle);
        }
        while let Ok(event) = self.rx.try_recv() {
            if !matches!(event, TransportEvent::Progress { .. }) {
                self.aborting.remove(event.id());
            }
        }
        tracing::debug!(draining = self.aborting.len(), "scheduler stopped");
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.refill();
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// No unit is active, pending, or waiting to be reported.
    pub fn is_idle(&self) -> bool {
        self.active.is_empty() && self.pending.is_empty() && self.ready.is_empty()
    }

    /// Highest number of simultaneously active transfers seen so far.
    pub fn peak_active(&self) -> usize {
        self.peak_active
    }
}
