//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

pub mod range_server;
pub mod scripted;

use std::fs;
use std::path::{Path, PathBuf};

use assetsync_core::engine::{EngineOptions, SyncEngine, SyncEvent};
use assetsync_core::manifest::{AssetKind, AssetRecord, Manifest};
use tempfile::TempDir;

pub const CDN: &str = "http://cdn.test/";

pub fn asset(path: &str, md5: &str) -> AssetRecord {
    AssetRecord::new(path, md5, 0, AssetKind::Normal)
}

/// Catalog with `base` as the root of its package, manifest and version URLs.
pub fn manifest(base: &str, version: &str, assets: &[AssetRecord]) -> Manifest {
    let mut m = Manifest::new("");
    m.set_version(version);
    m.set_package_url(format!("{}pkg/", base));
    m.set_remote_manifest_url(format!("{}project.manifest", base));
    m.set_remote_version_url(format!("{}version.manifest", base));
    for a in assets {
        m.insert_asset(a.clone());
    }
    m
}

pub fn manifest_json(version: &str, assets: &[AssetRecord]) -> Vec<u8> {
    manifest(CDN, version, assets)
        .to_json_string()
        .unwrap()
        .into_bytes()
}

pub fn version_json(version: &str) -> Vec<u8> {
    format!(r#"{{"version": "{}"}}"#, version).into_bytes()
}

/// Bundled manifest plus a storage root, all inside one temp dir.
pub struct Fixture {
    pub dir: TempDir,
    pub bundled: PathBuf,
    pub storage: PathBuf,
}

impl Fixture {
    pub fn new(local: &Manifest) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bundled = dir.path().join("bundle").join("project.manifest");
        local.save(&bundled).unwrap();
        let storage = dir.path().join("assets");
        Self {
            dir,
            bundled,
            storage,
        }
    }

    pub fn options(&self) -> EngineOptions {
        EngineOptions::new(&self.bundled, &self.storage)
    }

    pub fn temp_root(&self) -> PathBuf {
        self.dir.path().join("assets_temp")
    }

    /// Write an already-installed asset into the storage root.
    pub fn install(&self, path: &str, body: &[u8]) {
        write(&self.storage.join(path), body);
    }

    pub fn installed(&self, path: &str) -> Option<Vec<u8>> {
        fs::read(self.storage.join(path)).ok()
    }
}

pub fn write(path: &Path, body: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
}

pub fn drain(rx: &std::sync::mpsc::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    rx.try_iter().collect()
}

/// Tick until the engine settles or `max` ticks pass.
pub fn tick_until_settled(engine: &mut SyncEngine, max: usize) {
    for _ in 0..max {
        engine.tick();
        if engine.is_settled() {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    panic!("engine did not settle in {} ticks (state {})", max, engine.state());
}
