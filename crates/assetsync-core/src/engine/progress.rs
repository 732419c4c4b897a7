//! Batch progress: files settled, bytes received, and checkpoint thresholds.

use std::collections::HashMap;

use super::events::ProgressSnapshot;
use crate::scheduler::DownloadUnit;

#[derive(Debug, Default, Clone, Copy)]
struct UnitProgress {
    received: u64,
    expected: Option<u64>,
    settled: bool,
}

/// Tracks one batch of units. Settling is idempotent per unit, so a late or
/// duplicate completion cannot push the counters past the batch size.
#[derive(Debug)]
pub struct ProgressAggregator {
    units: HashMap<String, UnitProgress>,
    total_files: usize,
    waiting: usize,
    total_size: u64,
    downloaded: u64,
    sized: usize,
    save_interval: u32,
    next_save_point: u32,
}

impl ProgressAggregator {
    /// `save_interval` is in percent; 0 disables intermediate checkpoints.
    pub fn new(save_interval: u32) -> Self {
        Self {
            units: HashMap::new(),
            total_files: 0,
            waiting: 0,
            total_size: 0,
            downloaded: 0,
            sized: 0,
            save_interval: save_interval.min(100),
            next_save_point: 0,
        }
    }

    /// Reset for a new batch. Sizes recorded in the units count as known.
    pub fn start_batch(&mut self, units: &[DownloadUnit]) {
        self.units.clear();
        self.total_size = 0;
        self.downloaded = 0;
        self.sized = 0;
        for unit in units {
            let entry = UnitProgress {
                expected: unit.expected_size,
                ..UnitProgress::default()
            };
            if let Some(size) = unit.expected_size {
                self.total_size += size;
                self.sized += 1;
            }
            self.units.insert(unit.id.clone(), entry);
        }
        self.total_files = self.units.len();
        self.waiting = self.total_files;
        self.next_save_point = self.save_interval;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    pub fn is_settled(&self, id: &str) -> bool {
        self.units.get(id).map(|u| u.settled).unwrap_or(false)
    }

    /// Apply a transport progress report. Returns false for ids outside the batch.
    pub fn record_progress(&mut self, id: &str, total_received: u64, total_expected: u64) -> bool {
        let Some(unit) = self.units.get_mut(id) else {
            return false;
        };
        if unit.settled {
            return false;
        }
        if unit.expected.is_none() && total_expected > 0 {
            unit.expected = Some(total_expected);
            self.total_size += total_expected;
            self.sized += 1;
        }
        if total_received >= unit.received {
            self.downloaded += total_received - unit.received;
        } else {
            // Transfer restarted from zero.
            self.downloaded = self.downloaded.saturating_sub(unit.received - total_received);
        }
        unit.received = total_received;
        true
    }

    /// Mark a unit settled (succeeded or failed). Returns false if it was not
    /// part of the batch or had already settled.
    pub fn settle(&mut self, id: &str, succeeded: bool) -> bool {
        let Some(unit) = self.units.get_mut(id) else {
            return false;
        };
        if unit.settled {
            return false;
        }
        unit.settled = true;
        if succeeded {
            if let Some(expected) = unit.expected {
                if unit.received < expected {
                    self.downloaded += expected - unit.received;
                    unit.received = expected;
                }
            }
        }
        self.waiting = self.waiting.saturating_sub(1);
        true
    }

    /// Every unit's size has been observed.
    pub fn size_fully_known(&self) -> bool {
        self.sized >= self.total_files
    }

    pub fn percent_by_file(&self) -> u32 {
        if self.total_files == 0 {
            return 100;
        }
        (100 * (self.total_files - self.waiting) / self.total_files) as u32
    }

    pub fn percent(&self) -> Option<f64> {
        if !self.size_fully_known() {
            return None;
        }
        if self.total_size == 0 {
            return Some(if self.waiting == 0 { 100.0 } else { 0.0 });
        }
        Some((100.0 * self.downloaded as f64 / self.total_size as f64).min(100.0))
    }

    /// True once each time the per-file percent crosses the next multiple of the save interval.
    pub fn take_checkpoint(&mut self) -> bool {
        if self.save_interval == 0 {
            return false;
        }
        let pct = self.percent_by_file();
        if pct < self.next_save_point {
            return false;
        }
        self.next_save_point = (pct / self.save_interval + 1) * self.save_interval;
        true
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn settled_files(&self) -> usize {
        self.total_files - self.waiting
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_size
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            percent: self.percent(),
            percent_by_file: self.percent_by_file(),
            downloaded_bytes: self.downloaded,
            total_bytes: self.total_size,
            downloaded_files: self.settled_files(),
            total_files: self.total_files,
        }
    }
}
