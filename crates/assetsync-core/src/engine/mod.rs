//! Update engine.
//!
//! [`SyncEngine`] sequences version check, manifest fetch, diff, download and
//! commit as an explicit state machine. It owns the local, remote and temp
//! manifests and a [`DownloadScheduler`]; nothing happens between calls to
//! [`SyncEngine::tick`], which drains transfer and decompression completions
//! and advances the state. Callers drive it from their own loop or with
//! [`run_until_settled`].
//!
//! Typical use:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use assetsync_core::engine::{EngineOptions, SyncEngine};
//! # use assetsync_core::transport::HttpTransport;
//! # async fn demo() -> anyhow::Result<()> {
//! let options = EngineOptions::new("bundle/project.manifest", "/var/lib/game/assets");
//! let mut engine = SyncEngine::new(options, Arc::new(HttpTransport::default()))?;
//! let events = engine.subscribe();
//! engine.update();
//! assetsync_core::engine::run_until_settled(&mut engine, std::time::Duration::from_millis(100)).await;
//! for event in events.try_iter() {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

mod commit;
pub mod driver;
mod events;
mod failures;
mod paths;
mod progress;
mod state;

pub use commit::CommitError;
pub use driver::{run_until_settled, run_until_settled_with};
pub use events::{ProgressSnapshot, SyncEvent};
pub use failures::FailureRegistry;
pub use paths::StorageLayout;
pub use progress::ProgressAggregator;
pub use state::{SyncState, UpdateIntent};

use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::decompress::{gunzip_in_place, TaskCategory, TaskPool};
use crate::manifest::{asset_url, AssetKind, AssetRecord, DiffKind, DownloadState, Manifest, VersionComparator};
use crate::scheduler::{DownloadScheduler, DownloadUnit, SchedulerEvent};
use crate::transport::{TransferError, Transport};
use commit::remove_dir_if_exists;

/// Scheduler id of the version file transfer.
pub const VERSION_ID: &str = "@version";
/// Scheduler id of the remote manifest transfer.
pub const MANIFEST_ID: &str = "@manifest";

/// Post-transfer check: `(received file, manifest record) -> accept`.
pub type VerifyCallback = Arc<dyn Fn(&Path, &AssetRecord) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct EngineOptions {
    /// Manifest shipped with the application.
    pub bundled_manifest: PathBuf,
    /// Where installed assets and the cached manifest live.
    pub storage_root: PathBuf,
    pub max_concurrent: usize,
    pub save_point_interval: u32,
    pub temp_package_suffix: String,
    pub decompress_workers: usize,
    /// Used for the cached-vs-bundled check at construction and for every later comparison.
    pub version_comparator: Option<VersionComparator>,
}

impl EngineOptions {
    pub fn new(bundled_manifest: impl Into<PathBuf>, storage_root: impl Into<PathBuf>) -> Self {
        Self::from_config(&SyncConfig::default(), bundled_manifest, storage_root)
    }

    pub fn from_config(
        cfg: &SyncConfig,
        bundled_manifest: impl Into<PathBuf>,
        storage_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bundled_manifest: bundled_manifest.into(),
            storage_root: storage_root.into(),
            max_concurrent: cfg.max_concurrent,
            save_point_interval: cfg.save_point_interval,
            temp_package_suffix: cfg.temp_package_suffix.clone(),
            decompress_workers: cfg.decompress_workers,
            version_comparator: None,
        }
    }
}

struct DecompressOutcome {
    unit: DownloadUnit,
    result: std::io::Result<u64>,
}

pub struct SyncEngine {
    layout: StorageLayout,
    state: SyncState,
    intent: Option<UpdateIntent>,
    local: Manifest,
    remote: Manifest,
    /// Ledger of the in-flight update, present once prepared or found on disk.
    temp: Option<Manifest>,
    units: Vec<DownloadUnit>,
    scheduler: DownloadScheduler,
    decompressor: TaskPool<DecompressOutcome>,
    failures: FailureRegistry,
    progress: ProgressAggregator,
    comparator: Option<VersionComparator>,
    verifier: Option<VerifyCallback>,
    events: Option<Sender<SyncEvent>>,
    resuming: bool,
    package_url: String,
}

impl SyncEngine {
    /// Build an engine over `transport`. Loads the temp ledger (if any) and the
    /// local manifest; without a usable local manifest the engine stays
    /// `Uninitialized` and every update call reports `NoLocalManifest`.
    pub fn new(options: EngineOptions, transport: Arc<dyn Transport>) -> Result<Self> {
        let layout = StorageLayout::new(&options.storage_root, &options.temp_package_suffix);
        fs::create_dir_all(layout.storage_root())
            .with_context(|| format!("create storage root {}", layout.storage_root().display()))?;
        let decompressor = TaskPool::new(options.decompress_workers);

        let mut engine = Self {
            local: Manifest::new(layout.storage_root()),
            remote: Manifest::new(layout.temp_root()),
            layout,
            state: SyncState::Uninitialized,
            intent: None,
            temp: None,
            units: Vec::new(),
            scheduler: DownloadScheduler::new(transport, options.max_concurrent),
            decompressor,
            failures: FailureRegistry::new(),
            progress: ProgressAggregator::new(options.save_point_interval),
            comparator: options.version_comparator.clone(),
            verifier: None,
            events: None,
            resuming: false,
            package_url: String::new(),
        };
        engine.init_temp_manifest();
        engine.load_local_manifest(&options.bundled_manifest);
        Ok(engine)
    }

    fn init_temp_manifest(&mut self) {
        let path = self.layout.temp_manifest();
        if !path.exists() {
            return;
        }
        let mut ledger = Manifest::new(self.layout.temp_root());
        match ledger.parse_file(&path) {
            Ok(()) => {
                tracing::info!(
                    version = %ledger.version(),
                    path = %path.display(),
                    "found interrupted update ledger"
                );
                self.temp = Some(ledger);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable update ledger");
                if let Err(e) = remove_dir_if_exists(self.layout.temp_root()) {
                    tracing::warn!(error = %e, "could not remove temp root");
                }
            }
        }
    }

    /// Load the local manifest, preferring the cached one in the storage root
    /// when it is at least as new as the bundled one. Only allowed before a
    /// cycle starts. Returns whether a local manifest is now loaded.
    pub fn load_local_manifest(&mut self, bundled: &Path) -> bool {
        if self.state > SyncState::Unchecked {
            tracing::warn!(state = %self.state, "local manifest can only be replaced before an update starts");
            return false;
        }

        let cache_path = self.layout.cached_manifest();
        let mut cached = None;
        if cache_path.exists() {
            match Manifest::from_file(&cache_path) {
                Ok(m) => cached = Some(m),
                Err(e) => {
                    tracing::warn!(path = %cache_path.display(), error = %e, "removing unreadable cached manifest");
                    let _ = fs::remove_file(&cache_path);
                }
            }
        }

        let mut shipped = Manifest::default();
        if let Err(e) = shipped.parse_file(bundled) {
            tracing::warn!(path = %bundled.display(), error = %e, "bundled manifest unavailable");
        }

        let chosen = match (shipped.is_loaded(), cached) {
            (true, Some(cache)) => {
                if cache.version_greater_or_equal(&shipped, self.comparator.as_ref()) {
                    tracing::debug!(version = %cache.version(), "using cached manifest");
                    Some(cache)
                } else {
                    tracing::info!(
                        cached = %cache.version(),
                        bundled = %shipped.version(),
                        "bundled manifest is newer; purging cached assets"
                    );
                    self.purge_cached(&cache);
                    Some(shipped)
                }
            }
            (true, None) => Some(shipped),
            (false, Some(cache)) => Some(cache),
            (false, None) => None,
        };

        match chosen {
            Some(m) => {
                tracing::info!(version = %m.version(), assets = m.assets().len(), "local manifest loaded");
                self.local = m;
                self.state = SyncState::Unchecked;
                true
            }
            None => {
                tracing::error!("no local manifest found");
                self.local = Manifest::new(self.layout.storage_root());
                self.state = SyncState::Uninitialized;
                false
            }
        }
    }

    fn purge_cached(&self, cache: &Manifest) {
        for path in cache.assets().keys() {
            let target = self.layout.installed_asset(path);
            if let Err(e) = fs::remove_file(&target) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %target.display(), error = %e, "could not remove cached asset");
                }
            }
        }
        let _ = fs::remove_file(self.layout.cached_manifest());
    }

    /// Use an already-loaded remote manifest instead of downloading one.
    /// Only valid in `Unchecked` with a local manifest loaded.
    pub fn load_remote_manifest(&mut self, remote: Manifest) -> bool {
        if self.state != SyncState::Unchecked || !self.local.is_loaded() || !remote.is_loaded() {
            return false;
        }
        self.remote = remote;
        self.remote.set_root(self.layout.temp_root());
        if self.local_is_current() {
            self.state = SyncState::UpToDate;
            self.discard_temp_root();
            self.dispatch(SyncEvent::AlreadyUpToDate);
        } else {
            self.state = SyncState::NeedUpdate;
            let ev = self.new_version_event();
            self.dispatch(ev);
        }
        true
    }

    /// Register the single event subscriber, replacing any previous one.
    pub fn subscribe(&mut self) -> Receiver<SyncEvent> {
        let (tx, rx) = mpsc::channel();
        self.events = Some(tx);
        rx
    }

    fn dispatch(&mut self, event: SyncEvent) {
        if event.is_terminal()
            || (matches!(event, SyncEvent::NewVersionFound { .. })
                && self.intent == Some(UpdateIntent::CheckUpdate))
        {
            self.intent = None;
        }
        if !matches!(event, SyncEvent::UpdateProgress { .. }) {
            tracing::debug!(?event, "sync event");
        }
        let closed = self
            .events
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_err());
        if closed {
            self.events = None;
        }
    }

    fn new_version_event(&self) -> SyncEvent {
        SyncEvent::NewVersionFound {
            local_version: self.local.version().to_string(),
            remote_version: self.remote.version().to_string(),
        }
    }

    fn local_is_current(&self) -> bool {
        self.local
            .version_greater_or_equal(&self.remote, self.comparator.as_ref())
    }

    fn discard_temp_root(&mut self) {
        self.temp = None;
        if let Err(e) = remove_dir_if_exists(self.layout.temp_root()) {
            tracing::warn!(path = %self.layout.temp_root().display(), error = %e, "could not remove temp root");
        }
    }

    fn begin(&mut self, intent: UpdateIntent) -> bool {
        if let Some(current) = self.intent {
            tracing::warn!(?current, requested = ?intent, "update already in progress; call ignored");
            return false;
        }
        if !self.local.is_loaded() {
            tracing::error!("no local manifest; cannot check for updates");
            self.dispatch(SyncEvent::NoLocalManifest);
            return false;
        }
        self.intent = Some(intent);
        if self.state == SyncState::FailToUpdate {
            self.state = SyncState::Unchecked;
        }
        true
    }

    /// Find out whether a newer version exists. Never downloads assets.
    pub fn check_update(&mut self) {
        if !self.begin(UpdateIntent::CheckUpdate) {
            return;
        }
        match self.state {
            SyncState::Unchecked | SyncState::PredownloadVersion => self.download_version(),
            SyncState::UpToDate => self.dispatch(SyncEvent::AlreadyUpToDate),
            SyncState::NeedUpdate | SyncState::ReadyToUpdate => {
                let ev = self.new_version_event();
                self.dispatch(ev);
            }
            other => {
                tracing::debug!(state = %other, "check_update has nothing to do");
                self.intent = None;
            }
        }
    }

    /// Drive the cycle through download and commit.
    pub fn update(&mut self) {
        if !self.begin(UpdateIntent::DoUpdate) {
            return;
        }
        match self.state {
            SyncState::Unchecked | SyncState::PredownloadVersion => self.download_version(),
            SyncState::PredownloadManifest => self.download_manifest(),
            SyncState::NeedUpdate | SyncState::ReadyToUpdate => {
                if self.remote.is_loaded() {
                    self.start_update();
                } else {
                    self.state = SyncState::PredownloadManifest;
                    self.download_manifest();
                }
            }
            SyncState::UpToDate => self.dispatch(SyncEvent::AlreadyUpToDate),
            other => {
                tracing::debug!(state = %other, "update has nothing to do");
                self.intent = None;
            }
        }
    }

    fn download_version(&mut self) {
        let url = self.local.remote_version_url().to_string();
        if url.is_empty() {
            tracing::info!("no version url; fetching manifest directly");
            self.state = SyncState::PredownloadManifest;
            self.download_manifest();
            return;
        }
        self.state = SyncState::DownloadingVersion;
        tracing::info!(url = %url, "downloading version file");
        self.scheduler.enqueue([DownloadUnit::new(
            VERSION_ID,
            url,
            self.layout.temp_version(),
        )]);
    }

    fn on_version_done(&mut self, error: Option<TransferError>) {
        if self.state != SyncState::DownloadingVersion {
            return;
        }
        if let Some(e) = error {
            tracing::warn!(error = %e, "version file unavailable; fetching manifest");
            self.state = SyncState::PredownloadManifest;
            self.download_manifest();
            return;
        }
        self.state = SyncState::VersionLoaded;
        self.parse_version();
    }

    fn parse_version(&mut self) {
        let path = self.layout.temp_version();
        let mut header = Manifest::new(self.layout.temp_root());
        let parsed = header.parse_version_file(&path);
        let _ = fs::remove_file(&path);
        if let Err(e) = parsed {
            tracing::warn!(error = %e, "version file unreadable; fetching manifest");
            self.state = SyncState::PredownloadManifest;
            self.download_manifest();
            return;
        }
        self.remote = header;
        if self.local_is_current() {
            tracing::info!(version = %self.local.version(), "already up to date");
            self.state = SyncState::UpToDate;
            self.dispatch(SyncEvent::AlreadyUpToDate);
            return;
        }
        self.state = SyncState::NeedUpdate;
        let ev = self.new_version_event();
        let continue_update = self.intent == Some(UpdateIntent::DoUpdate);
        self.dispatch(ev);
        if continue_update {
            self.state = SyncState::PredownloadManifest;
            self.download_manifest();
        }
    }

    fn download_manifest(&mut self) {
        if self.state != SyncState::PredownloadManifest {
            return;
        }
        let url = self.local.remote_manifest_url().to_string();
        if url.is_empty() {
            tracing::error!("local manifest has no remote manifest url");
            self.state = SyncState::Unchecked;
            self.dispatch(SyncEvent::ManifestDownloadError {
                message: "no remote manifest url".to_string(),
            });
            return;
        }
        self.state = SyncState::DownloadingManifest;
        tracing::info!(url = %url, "downloading remote manifest");
        self.scheduler.enqueue([DownloadUnit::new(
            MANIFEST_ID,
            url,
            self.layout.temp_remote_manifest(),
        )]);
    }

    fn on_manifest_done(&mut self, error: Option<TransferError>) {
        if self.state != SyncState::DownloadingManifest {
            return;
        }
        if let Some(e) = error {
            tracing::error!(error = %e, "remote manifest download failed");
            self.state = SyncState::FailToUpdate;
            self.dispatch(SyncEvent::ManifestDownloadError {
                message: e.to_string(),
            });
            return;
        }
        self.state = SyncState::ManifestLoaded;
        self.parse_manifest();
    }

    fn parse_manifest(&mut self) {
        let mut remote = Manifest::new(self.layout.temp_root());
        if let Err(e) = remote.parse_file(&self.layout.temp_remote_manifest()) {
            tracing::error!(error = %e, "remote manifest unreadable");
            self.state = SyncState::Unchecked;
            self.dispatch(SyncEvent::ManifestParseError {
                message: e.to_string(),
            });
            return;
        }
        self.remote = remote;
        if self.local_is_current() {
            tracing::info!(version = %self.local.version(), "already up to date");
            self.state = SyncState::UpToDate;
            self.discard_temp_root();
            self.dispatch(SyncEvent::AlreadyUpToDate);
            return;
        }
        self.state = SyncState::NeedUpdate;
        tracing::info!(
            local = %self.local.version(),
            remote = %self.remote.version(),
            "new version found"
        );
        let ev = self.new_version_event();
        let continue_update = self.intent == Some(UpdateIntent::DoUpdate);
        self.dispatch(ev);
        if continue_update {
            self.start_update();
        }
    }

    /// Build the unit list for the pending update: resume the temp ledger when
    /// it belongs to the same remote version, otherwise diff local against
    /// remote and start a fresh ledger. Only valid in `NeedUpdate`.
    pub fn prepare_update(&mut self) {
        if self.state != SyncState::NeedUpdate {
            tracing::debug!(state = %self.state, "prepare_update ignored");
            return;
        }
        if !self.remote.is_loaded() {
            tracing::warn!("remote manifest not loaded; cannot prepare update");
            return;
        }
        self.package_url = if self.remote.package_url().is_empty() {
            self.local.package_url().to_string()
        } else {
            self.remote.package_url().to_string()
        };
        self.units.clear();
        self.resuming = false;

        let resumable = self.temp.as_ref().is_some_and(|t| {
            t.is_loaded() && t.is_updating() && t.version_equals(&self.remote)
        });
        if resumable {
            if let Some(ledger) = self.temp.as_mut() {
                ledger.set_root(self.layout.temp_root());
                ledger.set_package_url(self.package_url.clone());
                self.units = ledger.gen_resume_list();
            }
            self.resuming = true;
            tracing::info!(pending = self.units.len(), "resuming interrupted update");
        } else {
            self.discard_temp_root();
            let mut ledger = self.remote.clone();
            ledger.set_root(self.layout.temp_root());
            ledger.set_package_url(self.package_url.clone());

            let diff = self.local.diff(&self.remote);
            for (path, entry) in &diff {
                if entry.kind == DiffKind::Deleted {
                    continue;
                }
                self.units.push(DownloadUnit {
                    id: path.clone(),
                    source_url: format!(
                        "{}?md5={}",
                        asset_url(&self.package_url, path),
                        entry.asset.md5
                    ),
                    storage_path: self.layout.temp_asset(path),
                    expected_size: (entry.asset.size > 0).then_some(entry.asset.size),
                });
                ledger.set_download_state(path, DownloadState::Unstarted);
            }
            for path in self.remote.assets().keys() {
                if !diff.contains_key(path) {
                    ledger.set_download_state(path, DownloadState::Succeeded);
                }
            }
            ledger.set_updating(true);
            if let Err(e) = ledger.save(&self.layout.temp_manifest()) {
                tracing::warn!(error = %e, "could not persist update ledger; resume unavailable");
            }
            let (added, modified, deleted) = crate::manifest::summarize(&diff);
            tracing::info!(added, modified, deleted, units = self.units.len(), "update prepared");
            self.temp = Some(ledger);
        }
        self.state = SyncState::ReadyToUpdate;
    }

    fn start_update(&mut self) {
        if self.state == SyncState::NeedUpdate {
            self.prepare_update();
        }
        if self.state != SyncState::ReadyToUpdate {
            return;
        }
        self.failures.clear();
        let units = self.units.clone();
        self.progress.start_batch(&units);
        self.state = SyncState::Updating;
        if units.is_empty() {
            tracing::info!("nothing to download");
            self.commit();
            return;
        }
        self.launch(units);
    }

    fn launch(&mut self, units: Vec<DownloadUnit>) {
        if let Some(ledger) = self.temp.as_mut() {
            for unit in &units {
                ledger.set_download_state(&unit.id, DownloadState::Downloading);
            }
        }
        tracing::info!(units = units.len(), resuming = self.resuming, "downloading assets");
        self.scheduler.enqueue(units);
    }

    /// Retry exactly the units that failed in the last cycle, without re-diffing.
    pub fn download_failed_assets(&mut self) {
        if self.state.is_updating() {
            tracing::warn!("update in progress; retry ignored");
            return;
        }
        if let Some(current) = self.intent {
            tracing::warn!(?current, "call in progress; retry ignored");
            return;
        }
        if !self.local.is_loaded() || !self.remote.is_loaded() || self.temp.is_none() {
            tracing::warn!("manifests not loaded; nothing to retry");
            return;
        }
        if self.failures.is_empty() {
            tracing::debug!("no failed assets to retry");
            return;
        }
        let units = self.failures.take_all();
        tracing::info!(count = units.len(), "retrying failed assets");
        self.intent = Some(UpdateIntent::DoUpdate);
        self.units = units.clone();
        self.progress.start_batch(&units);
        self.state = SyncState::Updating;
        self.launch(units);
    }

    /// Drain transfer and decompression completions and advance the state machine.
    pub fn tick(&mut self) {
        for event in self.scheduler.poll() {
            match event {
                SchedulerEvent::Progress {
                    id,
                    total_received,
                    total_expected,
                    ..
                } => self.on_progress(&id, total_received, total_expected),
                SchedulerEvent::Finished { unit, error } => self.on_unit_finished(unit, error),
            }
        }
        for outcome in self.decompressor.drain() {
            self.on_decompressed(outcome);
        }
        self.check_batch_complete();
    }

    fn on_progress(&mut self, id: &str, total_received: u64, total_expected: u64) {
        if !self.state.is_updating() {
            return;
        }
        if self.progress.record_progress(id, total_received, total_expected) {
            let progress = self.progress.snapshot();
            self.dispatch(SyncEvent::UpdateProgress { progress });
        }
    }

    fn in_current_batch(&self, id: &str) -> bool {
        self.state.is_updating() && self.progress.contains(id) && !self.progress.is_settled(id)
    }

    fn on_unit_finished(&mut self, unit: DownloadUnit, error: Option<TransferError>) {
        match unit.id.as_str() {
            VERSION_ID => return self.on_version_done(error),
            MANIFEST_ID => return self.on_manifest_done(error),
            _ => {}
        }
        if !self.in_current_batch(&unit.id) {
            tracing::debug!(id = %unit.id, "ignoring completion outside the current batch");
            return;
        }
        if let Some(e) = error {
            self.on_unit_failed(unit, e);
            return;
        }

        let record = self
            .temp
            .as_ref()
            .and_then(|t| t.asset(&unit.id))
            .or_else(|| self.remote.asset(&unit.id))
            .cloned();
        let accepted = match (&self.verifier, &record) {
            (Some(verify), Some(r)) => verify(&unit.storage_path, r),
            _ => true,
        };
        if !accepted {
            let _ = fs::remove_file(&unit.storage_path);
            let error = TransferError::verification(&unit.id);
            self.on_unit_failed(unit, error);
            return;
        }

        if record.is_some_and(|r| r.kind == AssetKind::GZip) {
            tracing::debug!(id = %unit.id, "queueing decompression");
            self.decompressor.submit(TaskCategory::Other, move || {
                let result = gunzip_in_place(&unit.storage_path);
                DecompressOutcome { unit, result }
            });
            return;
        }
        self.on_unit_succeeded(unit);
    }

    fn on_decompressed(&mut self, outcome: DecompressOutcome) {
        let DecompressOutcome { unit, result } = outcome;
        if !self.in_current_batch(&unit.id) {
            return;
        }
        match result {
            Ok(_) => self.on_unit_succeeded(unit),
            Err(e) => {
                let message = format!("unable to decompress {}: {}", unit.id, e);
                tracing::warn!(id = %unit.id, error = %e, "decompression failed");
                let _ = fs::remove_file(&unit.storage_path);
                self.dispatch(SyncEvent::DecompressError {
                    asset_id: unit.id.clone(),
                    message: message.clone(),
                });
                self.on_unit_failed(unit, TransferError::decompress(message));
            }
        }
    }

    fn on_unit_succeeded(&mut self, unit: DownloadUnit) {
        if let Some(ledger) = self.temp.as_mut() {
            ledger.set_download_state(&unit.id, DownloadState::Succeeded);
        }
        self.failures.remove(&unit.id);
        self.progress.settle(&unit.id, true);
        tracing::debug!(id = %unit.id, "asset updated");
        self.dispatch(SyncEvent::AssetUpdated { asset_id: unit.id });
        let progress = self.progress.snapshot();
        self.dispatch(SyncEvent::UpdateProgress { progress });
        self.maybe_checkpoint();
    }

    fn on_unit_failed(&mut self, unit: DownloadUnit, error: TransferError) {
        tracing::warn!(id = %unit.id, error = %error, "asset update failed");
        if let Some(ledger) = self.temp.as_mut() {
            ledger.set_download_state(&unit.id, DownloadState::Unstarted);
        }
        self.progress.settle(&unit.id, false);
        self.dispatch(SyncEvent::AssetUpdateError {
            asset_id: unit.id.clone(),
            message: error.to_string(),
            error_code: error.code.as_i32(),
            inner_error_code: error.detail,
        });
        self.failures.add(unit);
        self.maybe_checkpoint();
    }

    fn maybe_checkpoint(&mut self) {
        if self.progress.take_checkpoint() {
            self.save_ledger();
        }
    }

    fn save_ledger(&self) {
        if let Some(ledger) = &self.temp {
            if let Err(e) = ledger.save(&self.layout.temp_manifest()) {
                tracing::warn!(error = %e, "could not checkpoint update ledger");
            }
        }
    }

    fn check_batch_complete(&mut self) {
        if !self.state.is_updating() {
            return;
        }
        if self.progress.waiting() > 0 {
            if self.state == SyncState::Updating
                && self.scheduler.is_idle()
                && self.decompressor.outstanding() > 0
            {
                tracing::debug!(pending = self.decompressor.outstanding(), "transfers drained; decompressing");
                self.state = SyncState::Unzipping;
            }
            return;
        }
        self.save_ledger();
        if self.failures.is_empty() {
            self.commit();
            return;
        }
        let failed = self.failures.len();
        tracing::warn!(failed, "update failed");
        self.state = SyncState::FailToUpdate;
        self.dispatch(SyncEvent::UpdateFailed {
            failed,
            message: format!("{} asset(s) failed to update", failed),
        });
    }

    /// Abort one in-flight asset; it is recorded as failed.
    pub fn abort_asset(&mut self, id: &str) -> bool {
        if !self.in_current_batch(id) {
            return false;
        }
        match self.scheduler.abort(id) {
            Some(unit) => {
                self.on_unit_failed(unit, TransferError::aborted());
                true
            }
            None => false,
        }
    }

    /// Abort all transfers and drop the current intent. An interrupted asset
    /// phase returns to `NeedUpdate`, so the next `update` resumes from the ledger.
    pub fn stop(&mut self) {
        self.scheduler.stop();
        if self.state.is_updating() {
            self.save_ledger();
        }
        self.state = match self.state {
            SyncState::PredownloadVersion
            | SyncState::DownloadingVersion
            | SyncState::VersionLoaded
            | SyncState::PredownloadManifest
            | SyncState::DownloadingManifest
            | SyncState::ManifestLoaded => SyncState::Unchecked,
            SyncState::Updating | SyncState::Unzipping => SyncState::NeedUpdate,
            other => other,
        };
        self.intent = None;
        self.units.clear();
        tracing::info!(state = %self.state, "engine stopped");
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    pub fn resume(&mut self) {
        self.scheduler.resume();
    }

    pub fn set_max_concurrent(&mut self, max: usize) {
        self.scheduler.set_max_concurrent(max);
    }

    pub fn max_concurrent(&self) -> usize {
        self.scheduler.max_concurrent()
    }

    pub fn set_version_comparator<F>(&mut self, cmp: F)
    where
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        self.comparator = Some(Arc::new(cmp));
    }

    pub fn set_verify_callback<F>(&mut self, verify: F)
    where
        F: Fn(&Path, &AssetRecord) -> bool + Send + Sync + 'static,
    {
        self.verifier = Some(Arc::new(verify));
    }

    /// No intent, transfer or decompression is outstanding.
    pub fn is_settled(&self) -> bool {
        self.intent.is_none() && self.scheduler.is_idle() && self.decompressor.outstanding() == 0
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn intent(&self) -> Option<UpdateIntent> {
        self.intent
    }

    /// Whether the current update continues an interrupted one.
    pub fn is_resuming(&self) -> bool {
        self.resuming
    }

    pub fn total_bytes(&self) -> u64 {
        self.progress.total_bytes()
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.progress.downloaded_bytes()
    }

    pub fn total_files(&self) -> usize {
        self.progress.total_files()
    }

    pub fn downloaded_files(&self) -> usize {
        self.progress.settled_files()
    }

    pub fn percent(&self) -> Option<f64> {
        self.progress.percent()
    }

    pub fn percent_by_file(&self) -> u32 {
        self.progress.percent_by_file()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn local_manifest(&self) -> &Manifest {
        &self.local
    }

    pub fn remote_manifest(&self) -> &Manifest {
        &self.remote
    }

    pub fn temp_manifest(&self) -> Option<&Manifest> {
        self.temp.as_ref()
    }

    pub fn failed_units(&self) -> impl Iterator<Item = &DownloadUnit> {
        self.failures.units()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn peak_active_transfers(&self) -> usize {
        self.scheduler.peak_active()
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Where an installed asset lives: the storage root if it was updated there,
    /// else the local manifest's own root.
    pub fn installed_path(&self, key: &str) -> Option<PathBuf> {
        self.local.asset(key)?;
        let updated = self.layout.installed_asset(key);
        if updated.exists() {
            Some(updated)
        } else {
            Some(self.local.root().join(key))
        }
    }
}
