//! `assetsync update` – run an update cycle with progress output.

use anyhow::{bail, Result};
use assetsync_core::checksum;
use assetsync_core::config::SyncConfig;
use assetsync_core::engine::{run_until_settled_with, SyncEvent, SyncState};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;

use super::engine::open_engine;

#[derive(Debug, Clone)]
pub struct UpdateArgs {
    pub manifest: PathBuf,
    pub storage: PathBuf,
    pub max_concurrent: Option<usize>,
    pub verify: bool,
    pub retries: u32,
}

/// Prints one line per milestone and per whole-percent change.
#[derive(Default)]
struct Reporter {
    last_percent: Option<u32>,
    last_error: Option<String>,
}

impl Reporter {
    fn drain(&mut self, events: &Receiver<SyncEvent>) {
        for event in events.try_iter() {
            match event {
                SyncEvent::NewVersionFound {
                    local_version,
                    remote_version,
                } => println!("updating {} -> {}", local_version, remote_version),
                SyncEvent::UpdateProgress { progress } => {
                    if self.last_percent != Some(progress.percent_by_file) {
                        self.last_percent = Some(progress.percent_by_file);
                        println!(
                            "{:>3}%  {}/{} files  {} bytes",
                            progress.percent_by_file,
                            progress.downloaded_files,
                            progress.total_files,
                            progress.downloaded_bytes
                        );
                    }
                }
                SyncEvent::AssetUpdateError {
                    asset_id, message, ..
                } => eprintln!("failed: {} ({})", asset_id, message),
                SyncEvent::UpdateFinished { version } => println!("installed {}", version),
                SyncEvent::AlreadyUpToDate => println!("already up to date"),
                SyncEvent::NoLocalManifest => {
                    self.last_error = Some("no local manifest".to_string())
                }
                SyncEvent::ManifestDownloadError { message }
                | SyncEvent::ManifestParseError { message }
                | SyncEvent::UpdateFailed { message, .. } => self.last_error = Some(message),
                _ => {}
            }
        }
    }
}

pub async fn run_update(cfg: &SyncConfig, args: &UpdateArgs) -> Result<()> {
    let mut engine = open_engine(cfg, &args.manifest, &args.storage)?;
    if let Some(n) = args.max_concurrent {
        engine.set_max_concurrent(n);
    }
    if args.verify {
        engine.set_verify_callback(checksum::md5_verifier());
    }
    let events = engine.subscribe();
    let mut reporter = Reporter::default();

    engine.update();
    let mut retries_left = args.retries;
    loop {
        run_until_settled_with(&mut engine, cfg.tick_interval(), |_| reporter.drain(&events)).await;
        match engine.state() {
            SyncState::UpToDate => return Ok(()),
            SyncState::FailToUpdate if engine.failed_count() > 0 && retries_left > 0 => {
                retries_left -= 1;
                println!("retrying {} failed asset(s)", engine.failed_count());
                engine.download_failed_assets();
            }
            state => {
                let reason = reporter
                    .last_error
                    .take()
                    .unwrap_or_else(|| "no further progress".to_string());
                bail!("update stopped in state {}: {}", state, reason);
            }
        }
    }
}
