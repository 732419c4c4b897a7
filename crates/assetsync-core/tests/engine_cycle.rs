//! Integration test: full update cycles against a transport the test completes by hand.

mod common;

use std::fs;

use assetsync_core::checksum::md5_verifier;
use assetsync_core::engine::{SyncEngine, SyncEvent, SyncState, UpdateIntent, MANIFEST_ID, VERSION_ID};
use assetsync_core::manifest::{AssetRecord, Manifest};
use assetsync_core::transport::TransferErrorCode;
use common::scripted::ScriptedTransport;
use common::{asset, drain, manifest, manifest_json, version_json, Fixture, CDN};

/// Drive version and manifest downloads until the asset batch is running.
fn run_to_assets(
    engine: &mut SyncEngine,
    transport: &ScriptedTransport,
    version: &str,
    assets: &[AssetRecord],
) {
    engine.update();
    transport.succeed(VERSION_ID, &version_json(version));
    engine.tick();
    transport.succeed(MANIFEST_ID, &manifest_json(version, assets));
    engine.tick();
}

fn local_v1(assets: &[AssetRecord]) -> Manifest {
    manifest(CDN, "1.0.0", assets)
}

#[test]
fn update_installs_changed_assets_and_removes_deleted() {
    let local = local_v1(&[
        asset("a", "1"),
        asset("b", "1"),
        asset("c", "1"),
        asset("d", "1"),
        asset("f", "1"),
    ]);
    let fx = Fixture::new(&local);
    for p in ["a", "b", "c", "d", "f"] {
        fx.install(p, b"old");
    }
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    let events = engine.subscribe();

    run_to_assets(
        &mut engine,
        &transport,
        "2.0.0",
        &[
            asset("a", "2"),
            asset("b", "2"),
            asset("c", "2"),
            asset("e", "1"),
            asset("f", "1"),
        ],
    );
    assert_eq!(engine.state(), SyncState::Updating);
    assert_eq!(transport.open_ids(), vec!["a", "b", "c", "e"]);
    let req = transport.request("a").unwrap();
    assert_eq!(req.url, "http://cdn.test/pkg/a?md5=2");
    assert_eq!(req.destination, fx.temp_root().join("a"));
    assert!(fx.temp_root().join("project.manifest.temp").exists());

    for id in ["a", "b", "c", "e"] {
        transport.succeed(id, format!("new-{}", id).as_bytes());
    }
    engine.tick();

    assert_eq!(engine.state(), SyncState::UpToDate);
    assert_eq!(fx.installed("a").unwrap(), b"new-a");
    assert_eq!(fx.installed("e").unwrap(), b"new-e");
    assert_eq!(fx.installed("f").unwrap(), b"old");
    assert!(fx.installed("d").is_none(), "deleted asset must be removed");
    assert!(!fx.temp_root().exists());

    let cached = Manifest::from_file(&fx.storage.join("project.manifest")).unwrap();
    assert_eq!(cached.version(), "2.0.0");
    assert!(!cached.is_updating());
    assert_eq!(engine.local_manifest().version(), "2.0.0");

    let events = drain(&events);
    let updated = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::AssetUpdated { .. }))
        .count();
    assert_eq!(updated, 4);
    assert!(matches!(
        events.iter().find(|e| matches!(e, SyncEvent::NewVersionFound { .. })),
        Some(SyncEvent::NewVersionFound { local_version, remote_version })
            if local_version == "1.0.0" && remote_version == "2.0.0"
    ));
    assert_eq!(
        events.last(),
        Some(&SyncEvent::UpdateFinished {
            version: "2.0.0".to_string()
        })
    );
    assert!(engine.is_settled());
}

#[test]
fn concurrency_never_exceeds_bound() {
    let fx = Fixture::new(&local_v1(&[]));
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    engine.set_max_concurrent(2);

    let remote: Vec<_> = (0..5).map(|i| asset(&format!("u{}", i), "x")).collect();
    run_to_assets(&mut engine, &transport, "2.0.0", &remote);
    assert_eq!(transport.open_ids().len(), 2);

    let mut completed = 0;
    while let Some(id) = transport.open_ids().first().cloned() {
        transport.succeed(&id, b"data");
        engine.tick();
        completed += 1;
        assert!(transport.open_ids().len() <= 2);
    }
    assert_eq!(completed, 5);
    assert_eq!(engine.peak_active_transfers(), 2);
    assert_eq!(engine.state(), SyncState::UpToDate);
}

#[test]
fn failed_asset_blocks_commit_and_retry_fetches_only_it() {
    let ids = ["a", "b", "c", "d", "e"];
    let local = local_v1(&ids.map(|p| asset(p, "1")));
    let fx = Fixture::new(&local);
    for p in ids {
        fx.install(p, b"old");
    }
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    let events = engine.subscribe();

    run_to_assets(&mut engine, &transport, "2.0.0", &ids.map(|p| asset(p, "2")));
    for id in ids {
        if id == "c" {
            transport.fail(id, 404);
        } else {
            transport.succeed(id, b"new");
        }
    }
    engine.tick();

    assert_eq!(engine.state(), SyncState::FailToUpdate);
    assert_eq!(engine.failed_count(), 1);
    assert_eq!(engine.intent(), None);
    for p in ids {
        assert_eq!(fx.installed(p).unwrap(), b"old", "installed {} must be untouched", p);
    }
    let events = drain(&events);
    assert!(events.contains(&SyncEvent::AssetUpdateError {
        asset_id: "c".to_string(),
        message: "transport error: HTTP 404".to_string(),
        error_code: TransferErrorCode::ImplInternal.as_i32(),
        inner_error_code: 404,
    }));
    assert!(matches!(events.last(), Some(SyncEvent::UpdateFailed { failed: 1, .. })));

    let started_before = transport.started().len();
    engine.download_failed_assets();
    assert_eq!(engine.intent(), Some(UpdateIntent::DoUpdate));
    assert_eq!(transport.started().len(), started_before + 1);
    assert_eq!(transport.open_ids(), vec!["c"]);
    assert_eq!(engine.total_files(), 1);

    transport.succeed("c", b"new");
    engine.tick();
    assert_eq!(engine.state(), SyncState::UpToDate);
    for p in ids {
        assert_eq!(fx.installed(p).unwrap(), b"new");
    }
}

#[test]
fn interrupted_update_resumes_from_ledger() {
    let fx = Fixture::new(&local_v1(&[]));
    let remote: Vec<_> = ["a", "b", "c", "d"].iter().map(|p| asset(p, "2")).collect();

    {
        let transport = ScriptedTransport::new();
        let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
        run_to_assets(&mut engine, &transport, "2.0.0", &remote);
        transport.succeed("a", b"new-a");
        transport.succeed("b", b"new-b");
        engine.tick();
        assert_eq!(engine.downloaded_files(), 2);
    }

    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    assert!(engine.temp_manifest().is_some());
    run_to_assets(&mut engine, &transport, "2.0.0", &remote);
    assert!(engine.is_resuming());
    assert_eq!(transport.open_ids(), vec!["c", "d"]);
    assert_eq!(transport.request("c").unwrap().url, "http://cdn.test/pkg/c");

    transport.succeed("c", b"new-c");
    transport.succeed("d", b"new-d");
    engine.tick();
    assert_eq!(engine.state(), SyncState::UpToDate);
    for p in ["a", "b", "c", "d"] {
        assert_eq!(fx.installed(p).unwrap(), format!("new-{}", p).into_bytes());
    }
}

#[test]
fn matching_version_file_skips_manifest() {
    let fx = Fixture::new(&local_v1(&[asset("a", "1")]));
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    let events = engine.subscribe();

    engine.check_update();
    transport.succeed(VERSION_ID, &version_json("1.0.0"));
    engine.tick();

    assert_eq!(engine.state(), SyncState::UpToDate);
    assert_eq!(drain(&events), vec![SyncEvent::AlreadyUpToDate]);
    assert_eq!(transport.started_ids(), vec![VERSION_ID]);
    assert!(!fx.temp_root().join("version.manifest").exists());
}

#[test]
fn missing_version_file_falls_back_to_manifest() {
    let fx = Fixture::new(&local_v1(&[]));
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();

    engine.check_update();
    transport.fail(VERSION_ID, 404);
    engine.tick();
    assert_eq!(engine.state(), SyncState::DownloadingManifest);
    assert_eq!(transport.open_ids(), vec![MANIFEST_ID]);
}

#[test]
fn manifest_download_error_fails_cycle_and_update_restarts() {
    let fx = Fixture::new(&local_v1(&[]));
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    let events = engine.subscribe();

    engine.update();
    transport.succeed(VERSION_ID, &version_json("2.0.0"));
    engine.tick();
    transport.fail(MANIFEST_ID, 500);
    engine.tick();

    assert_eq!(engine.state(), SyncState::FailToUpdate);
    assert_eq!(engine.intent(), None);
    assert!(matches!(
        drain(&events).last(),
        Some(SyncEvent::ManifestDownloadError { .. })
    ));

    engine.update();
    assert_eq!(engine.state(), SyncState::DownloadingVersion);
    assert_eq!(
        transport.started_ids().iter().filter(|id| *id == VERSION_ID).count(),
        2
    );
}

#[test]
fn unparsable_manifest_returns_to_unchecked() {
    let fx = Fixture::new(&local_v1(&[]));
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    let events = engine.subscribe();

    engine.update();
    transport.fail(VERSION_ID, 404);
    engine.tick();
    transport.succeed(MANIFEST_ID, b"{ not json");
    engine.tick();

    assert_eq!(engine.state(), SyncState::Unchecked);
    assert!(matches!(
        drain(&events).last(),
        Some(SyncEvent::ManifestParseError { .. })
    ));
    assert!(engine.is_settled());
}

#[test]
fn manifest_listing_paths_outside_the_root_is_rejected() {
    for key in ["../../escape.bin", "/tmp/abs_escape.bin"] {
        let fx = Fixture::new(&local_v1(&[]));
        let transport = ScriptedTransport::new();
        let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
        let events = engine.subscribe();

        engine.update();
        transport.succeed(VERSION_ID, &version_json("2.0.0"));
        engine.tick();
        let body = format!(
            r#"{{"version":"2.0.0","packageUrl":"{}pkg/","assets":{{"ok.bin":{{"md5":"1"}},"{}":{{"md5":"1"}}}}}}"#,
            CDN, key
        );
        transport.succeed(MANIFEST_ID, body.as_bytes());
        engine.tick();

        assert_eq!(engine.state(), SyncState::Unchecked, "key {}", key);
        assert!(matches!(
            drain(&events).last(),
            Some(SyncEvent::ManifestParseError { message }) if message.contains("escapes")
        ));
        assert_eq!(transport.started_ids(), vec![VERSION_ID, MANIFEST_ID]);
        assert!(!fx.temp_root().join("project.manifest.temp").exists());
    }
}

#[test]
fn check_update_never_downloads_assets() {
    let fx = Fixture::new(&local_v1(&[asset("a", "1")]));
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();

    engine.check_update();
    transport.fail(VERSION_ID, 404);
    engine.tick();
    transport.succeed(MANIFEST_ID, &manifest_json("2.0.0", &[asset("a", "2")]));
    engine.tick();

    assert_eq!(engine.state(), SyncState::NeedUpdate);
    assert_eq!(engine.intent(), None);
    assert_eq!(transport.started_ids(), vec![VERSION_ID, MANIFEST_ID]);

    engine.update();
    assert_eq!(engine.state(), SyncState::Updating);
    assert_eq!(transport.started_ids(), vec![VERSION_ID, MANIFEST_ID, "a"]);
}

#[test]
fn aborted_asset_is_retried_after_its_transfer_settles() {
    let fx = Fixture::new(&local_v1(&[]));
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    let events = engine.subscribe();
    run_to_assets(&mut engine, &transport, "2.0.0", &[asset("a", "2"), asset("b", "2")]);

    assert!(engine.abort_asset("a"));
    assert!(transport.was_aborted("a"));
    assert!(drain(&events).iter().any(|e| e.asset_id() == Some("a")
        && e.error_code() == Some(TransferErrorCode::Abort.as_i32())));

    transport.succeed("b", b"new-b");
    engine.tick();
    assert_eq!(engine.state(), SyncState::FailToUpdate);

    engine.download_failed_assets();
    let starts_of_a = || transport.started_ids().iter().filter(|id| *id == "a").count();
    assert_eq!(starts_of_a(), 1, "must not restart while the old transfer is live");

    transport.settle_aborted("a");
    engine.tick();
    assert_eq!(starts_of_a(), 2);
    transport.succeed("a", b"new-a");
    engine.tick();
    assert_eq!(engine.state(), SyncState::UpToDate);
    assert_eq!(fx.installed("a").unwrap(), b"new-a");
}

#[test]
fn verification_failure_rejects_asset() {
    let fx = Fixture::new(&local_v1(&[]));
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    engine.set_verify_callback(md5_verifier());
    let events = engine.subscribe();

    run_to_assets(
        &mut engine,
        &transport,
        "2.0.0",
        &[
            asset("good", "b1946ac92492d2347c6235b4d2611184"),
            asset("bad", "deadbeef"),
        ],
    );
    transport.succeed("good", b"hello\n");
    transport.succeed("bad", b"hello\n");
    engine.tick();

    assert_eq!(engine.state(), SyncState::FailToUpdate);
    assert_eq!(engine.failed_units().map(|u| u.id.as_str()).collect::<Vec<_>>(), vec!["bad"]);
    assert!(!fx.temp_root().join("bad").exists());
    assert!(drain(&events).iter().any(|e| e.asset_id() == Some("bad")
        && e.error_code() == Some(TransferErrorCode::Verification.as_i32())));
}

#[test]
fn version_bump_without_asset_changes_commits_directly() {
    let fx = Fixture::new(&local_v1(&[asset("a", "1")]));
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    let events = engine.subscribe();

    run_to_assets(&mut engine, &transport, "1.0.1", &[asset("a", "1")]);

    assert_eq!(engine.state(), SyncState::UpToDate);
    assert_eq!(transport.started_ids(), vec![VERSION_ID, MANIFEST_ID]);
    assert_eq!(
        drain(&events).last(),
        Some(&SyncEvent::UpdateFinished {
            version: "1.0.1".to_string()
        })
    );
    let cached = Manifest::from_file(&fx.storage.join("project.manifest")).unwrap();
    assert_eq!(cached.version(), "1.0.1");
}

#[test]
fn stop_returns_to_need_update_and_update_resumes() {
    let fx = Fixture::new(&local_v1(&[]));
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    run_to_assets(&mut engine, &transport, "2.0.0", &[asset("a", "2"), asset("b", "2")]);
    transport.succeed("a", b"new-a");
    engine.tick();

    engine.stop();
    assert_eq!(engine.state(), SyncState::NeedUpdate);
    assert!(engine.is_settled());
    transport.settle_aborted("b");
    engine.tick();

    engine.update();
    assert!(engine.is_resuming());
    assert_eq!(transport.open_ids(), vec!["b"]);
    transport.succeed("b", b"new-b");
    engine.tick();
    assert_eq!(engine.state(), SyncState::UpToDate);
    assert_eq!(fx.installed("a").unwrap(), b"new-a");
}

#[test]
fn failed_commit_keeps_ledger_and_retry_installs_without_downloading() {
    let fx = Fixture::new(&local_v1(&[]));
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(fx.options(), transport.clone()).unwrap();
    let remote = [asset("a", "2"), asset("b", "2")];

    // A non-empty directory where `a` must land makes the promotion fail.
    fs::create_dir_all(fx.storage.join("a")).unwrap();
    fs::write(fx.storage.join("a/blocker"), b"x").unwrap();

    run_to_assets(&mut engine, &transport, "2.0.0", &remote);
    transport.succeed("a", b"new-a");
    transport.succeed("b", b"new-b");
    engine.tick();

    assert_eq!(engine.state(), SyncState::FailToUpdate);
    assert!(engine.temp_manifest().is_some());
    assert!(fx.temp_root().join("project.manifest.temp").exists());
    let cached = fx.storage.join("project.manifest");
    assert!(Manifest::from_file(&cached).map_or(true, |m| m.version() != "2.0.0"));

    fs::remove_dir_all(fx.storage.join("a")).unwrap();
    run_to_assets(&mut engine, &transport, "2.0.0", &remote);

    assert_eq!(engine.state(), SyncState::UpToDate);
    assert_eq!(fx.installed("a").unwrap(), b"new-a");
    assert_eq!(fx.installed("b").unwrap(), b"new-b");
    let asset_requests = transport
        .started_ids()
        .into_iter()
        .filter(|id| id == "a" || id == "b")
        .count();
    assert_eq!(asset_requests, 2);
    assert_eq!(Manifest::from_file(&cached).unwrap().version(), "2.0.0");
    assert!(!fx.temp_root().exists());
}
