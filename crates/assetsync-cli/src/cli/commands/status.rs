//! `assetsync status` – installed version and interrupted update, if any.

use anyhow::Result;
use assetsync_core::config::SyncConfig;
use assetsync_core::engine::StorageLayout;
use assetsync_core::manifest::Manifest;
use std::path::Path;

pub fn run_status(cfg: &SyncConfig, storage: &Path) -> Result<()> {
    let layout = StorageLayout::new(storage, &cfg.temp_package_suffix);

    let cached = layout.cached_manifest();
    if cached.exists() {
        let installed = Manifest::from_file(&cached)?;
        println!(
            "installed: {} ({} assets)",
            installed.version(),
            installed.assets().len()
        );
    } else {
        println!("installed: none (bundled manifest in use)");
    }

    let ledger_path = layout.temp_manifest();
    if !ledger_path.exists() {
        println!("no interrupted update");
        return Ok(());
    }
    match Manifest::from_file(&ledger_path) {
        Ok(ledger) if ledger.is_updating() => {
            let pending = ledger.gen_resume_list().len();
            println!(
                "interrupted update to {}: {} of {} assets pending",
                ledger.version(),
                pending,
                ledger.assets().len()
            );
        }
        Ok(ledger) => println!("finished ledger for {} awaiting commit", ledger.version()),
        Err(e) => println!("unreadable update ledger ({}); it will be discarded", e),
    }
    Ok(())
}
