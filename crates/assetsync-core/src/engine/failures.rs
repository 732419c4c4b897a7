//! Units that failed in the current cycle, kept for `download_failed_assets`.

use std::collections::BTreeMap;

use crate::scheduler::DownloadUnit;

#[derive(Debug, Default)]
pub struct FailureRegistry {
    units: BTreeMap<String, DownloadUnit>,
}

impl FailureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, unit: DownloadUnit) {
        self.units.insert(unit.id.clone(), unit);
    }

    pub fn remove(&mut self, id: &str) -> Option<DownloadUnit> {
        self.units.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> impl Iterator<Item = &DownloadUnit> {
        self.units.values()
    }

    /// Empty the registry, returning its units in path order.
    pub fn take_all(&mut self) -> Vec<DownloadUnit> {
        std::mem::take(&mut self.units).into_values().collect()
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }
}
