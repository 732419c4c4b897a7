//! `assetsync diff` – compare two manifest files.

use anyhow::{Context, Result};
use assetsync_core::manifest::{summarize, DiffKind, Manifest};
use std::path::Path;

pub fn run_diff(from: &Path, to: &Path) -> Result<()> {
    let old = Manifest::from_file(from).with_context(|| format!("read {}", from.display()))?;
    let new = Manifest::from_file(to).with_context(|| format!("read {}", to.display()))?;
    let diff = old.diff(&new);
    for (path, entry) in &diff {
        let tag = match entry.kind {
            DiffKind::Added => 'A',
            DiffKind::Modified => 'M',
            DiffKind::Deleted => 'D',
        };
        println!("{} {}", tag, path);
    }
    let (added, modified, deleted) = summarize(&diff);
    println!(
        "{} -> {}: {} added, {} modified, {} deleted",
        old.version(),
        new.version(),
        added,
        modified,
        deleted
    );
    Ok(())
}
