//! `assetsync check` – report whether a newer version is published.

use anyhow::{bail, Result};
use assetsync_core::config::SyncConfig;
use assetsync_core::engine::{run_until_settled, SyncEvent};
use std::path::Path;

use super::engine::open_engine;

pub async fn run_check(cfg: &SyncConfig, manifest: &Path, storage: &Path) -> Result<()> {
    let mut engine = open_engine(cfg, manifest, storage)?;
    let events = engine.subscribe();
    engine.check_update();
    run_until_settled(&mut engine, cfg.tick_interval()).await;

    for event in events.try_iter() {
        match event {
            SyncEvent::NewVersionFound {
                local_version,
                remote_version,
            } => {
                println!("new version {} available (installed {})", remote_version, local_version);
                return Ok(());
            }
            SyncEvent::AlreadyUpToDate => {
                println!("up to date ({})", engine.local_manifest().version());
                return Ok(());
            }
            SyncEvent::NoLocalManifest => bail!("no local manifest at {}", manifest.display()),
            SyncEvent::ManifestDownloadError { message } => {
                bail!("remote manifest download failed: {}", message)
            }
            SyncEvent::ManifestParseError { message } => {
                bail!("remote manifest is invalid: {}", message)
            }
            _ => {}
        }
    }
    bail!("check finished without a result (state {})", engine.state())
}
