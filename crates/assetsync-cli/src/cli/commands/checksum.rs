//! Checksum command: MD5 (manifest format) and SHA-256 of a file.

use anyhow::Result;
use assetsync_core::checksum;
use std::path::Path;

pub fn run_checksum(path: &Path) -> Result<()> {
    let md5 = checksum::md5_path(path)?;
    let sha256 = checksum::sha256_path(path)?;
    println!("md5     {}  {}", md5, path.display());
    println!("sha256  {}  {}", sha256, path.display());
    Ok(())
}
