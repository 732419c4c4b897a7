//! Commit protocol: promote the temp root into the storage root once every unit succeeded.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::events::SyncEvent;
use super::state::SyncState;
use super::SyncEngine;
use crate::manifest::{DiffKind, Manifest, ManifestError, MANIFEST_FILENAME, TEMP_MANIFEST_FILENAME};

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("save ledger: {0}")]
    Manifest(#[from] ManifestError),
    #[error("{what} {}: {source}", .path.display())]
    Io {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err<'a>(what: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> CommitError + 'a {
    move |source| CommitError::Io {
        what,
        path: path.to_path_buf(),
        source,
    }
}

fn relative_key(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Move every file under `from` to the same relative path under `to`,
/// overwriting existing files. Top-level files named in `keep` stay behind.
/// Returns the moved paths, `/`-separated.
pub(crate) fn move_tree(from: &Path, to: &Path, keep: &[&str]) -> Result<Vec<String>, CommitError> {
    let mut moved = Vec::new();
    if !from.exists() {
        return Ok(moved);
    }
    let mut stack = vec![from.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).map_err(io_err("read dir", &dir))? {
            let entry = entry.map_err(io_err("read dir", &dir))?;
            let src = entry.path();
            let file_type = entry.file_type().map_err(io_err("stat", &src))?;
            if file_type.is_dir() {
                stack.push(src);
                continue;
            }
            let rel = src.strip_prefix(from).unwrap_or(&src).to_path_buf();
            if keep.iter().any(|k| rel == Path::new(k)) {
                continue;
            }
            let dst = to.join(&rel);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent).map_err(io_err("create dir", parent))?;
            }
            if dst.is_file() {
                fs::remove_file(&dst).map_err(io_err("replace", &dst))?;
            }
            fs::rename(&src, &dst).map_err(io_err("move", &src))?;
            moved.push(relative_key(&rel));
        }
    }
    moved.sort();
    Ok(moved)
}

pub(crate) fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl SyncEngine {
    /// Run the commit protocol; on I/O failure the cycle ends in `FailToUpdate`.
    pub(super) fn commit(&mut self) {
        match self.try_commit() {
            Ok(version) => {
                self.state = SyncState::UpToDate;
                tracing::info!(version = %version, "update committed");
                self.dispatch(SyncEvent::UpdateFinished { version });
                if let Err(e) = remove_dir_if_exists(self.layout.temp_root()) {
                    tracing::warn!(path = %self.layout.temp_root().display(), error = %e, "could not remove temp root");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "commit failed");
                self.state = SyncState::FailToUpdate;
                self.dispatch(SyncEvent::UpdateFailed {
                    failed: self.failures.len(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Each step leaves the ledger in the temp root, so a failed commit can be
    /// retried by the next `update()` without downloading anything again.
    fn try_commit(&mut self) -> Result<String, CommitError> {
        let storage_root = self.layout.storage_root().to_path_buf();
        let temp_root = self.layout.temp_root().to_path_buf();

        // 1. Checkpoint the ledger.
        let ledger = self.temp.get_or_insert_with(|| {
            let mut ledger = self.remote.clone();
            ledger.set_root(&temp_root);
            ledger.set_updating(true);
            ledger
        });
        ledger.save(&self.layout.temp_manifest())?;
        let mut catalog = ledger.clone();

        // 2. Paths the new catalog no longer lists.
        let mut deleted: BTreeSet<String> = self
            .local
            .diff(&self.remote)
            .into_iter()
            .filter(|(_, d)| d.kind == DiffKind::Deleted)
            .map(|(path, _)| path)
            .collect();

        // 3. Promote everything received.
        let moved = move_tree(
            &temp_root,
            &storage_root,
            &[TEMP_MANIFEST_FILENAME, MANIFEST_FILENAME],
        )?;
        for path in &moved {
            deleted.remove(path);
        }
        tracing::debug!(moved = moved.len(), deleting = deleted.len(), "temp root promoted");

        // 4. Drop what was removed upstream.
        for path in &deleted {
            let target = self.layout.installed_asset(path);
            match fs::remove_file(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err("delete", &target)(e)),
            }
        }

        // 5. Install the catalog last; until now the cached manifest still names the old version.
        catalog.set_root(&storage_root);
        catalog.set_updating(false);
        catalog.save(&self.layout.cached_manifest())?;

        let mut installed = std::mem::take(&mut self.remote);
        installed.set_root(&storage_root);
        installed.set_updating(false);
        let version = installed.version().to_string();
        self.local = installed;
        self.remote = Manifest::new(&temp_root);
        self.temp = None;
        self.failures.clear();
        self.units.clear();
        self.resuming = false;
        Ok(version)
    }
}
