//! File digests: MD5 for manifest entries, SHA-256 for ad-hoc inspection.
//!
//! Digests are computed on demand after a transfer completes, never inline with
//! the receive path.

use anyhow::{Context, Result};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::manifest::AssetRecord;

const BUF_SIZE: usize = 64 * 1024;

fn digest_path<D: Digest>(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = D::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// MD5 of a file as lowercase hex (the format manifests use).
pub fn md5_path(path: &Path) -> Result<String> {
    digest_path::<Md5>(path)
}

/// SHA-256 of a file as lowercase hex.
pub fn sha256_path(path: &Path) -> Result<String> {
    digest_path::<Sha256>(path)
}

/// Verification predicate that compares a received file's MD5 with the manifest entry.
///
/// Records with an empty md5 are accepted. Comparison ignores ASCII case.
pub fn md5_verifier() -> impl Fn(&Path, &AssetRecord) -> bool + Send + Sync + 'static {
    |path: &Path, asset: &AssetRecord| {
        if asset.md5.is_empty() {
            return true;
        }
        match md5_path(path) {
            Ok(digest) => digest.eq_ignore_ascii_case(&asset.md5),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "md5 verification could not read file");
                false
            }
        }
    }
}
