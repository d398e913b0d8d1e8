// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! End-to-end exercises of the update controller's guard rails that
//! never need network access: the three-strike guard, the disabled-updates
//! skip, and applying a staged release with no staged state.

use std::path::PathBuf;

use semver::Version;
use serde_yaml::Value;

use sai_cam::config::Config;
use sai_cam::update::{RunOptions, UpdateController, UpdateState, UpdateStatus};

fn minimal_config(updates_yaml: &str) -> Config {
    let yaml = format!(
        r#"
cameras:
  - id: cam1
    kind: usb
    connection: /dev/video0
    capture_interval_seconds: 60
storage:
  base_path: /tmp/sai-cam-test-storage
updates:
{updates_yaml}
"#
    );
    serde_yaml::from_str::<Config>(&yaml).unwrap()
}

fn controller(dir: &std::path::Path, config: Config) -> UpdateController {
    UpdateController::new(
        dir.join("updater.lock"),
        dir.join("update_state.json"),
        dir.join("updates"),
        dir.join("installer"),
        Version::parse("1.0.0").unwrap(),
        config,
    )
}

#[tokio::test]
async fn three_strike_guard_refuses_without_force() {
    let dir = tempfile::tempdir().unwrap();
    let config = minimal_config("  enabled: true");
    let ctrl = controller(dir.path(), config);

    let mut state = UpdateState::new("1.0.0", Default::default());
    state.consecutive_failures = 3;
    state.save(&dir.path().join("update_state.json")).unwrap();

    let ran = ctrl.run(RunOptions { force: false, check_only: false }).await.unwrap();
    assert!(ran, "guard still reports a completed (no-op) run");

    let after = UpdateState::load_or_init(&dir.path().join("update_state.json"), "1.0.0", Default::default()).unwrap();
    assert_eq!(after.consecutive_failures, 3, "guard must not touch state or attempt a check");
}

#[tokio::test]
async fn three_strike_guard_is_bypassed_by_force_but_network_failure_does_not_panic() {
    let dir = tempfile::tempdir().unwrap();
    // Point at a release index URL nothing answers; the run must fail
    // gracefully (CheckFailed) rather than panic or hang.
    let config = minimal_config(
        "  enabled: true\n  release_index_url: \"http://127.0.0.1:1/releases.json\"",
    );
    let ctrl = controller(dir.path(), config);

    let mut state = UpdateState::new("1.0.0", Default::default());
    state.consecutive_failures = 3;
    state.save(&dir.path().join("update_state.json")).unwrap();

    let ran = ctrl.run(RunOptions { force: true, check_only: false }).await.unwrap();
    assert!(ran);

    let after = UpdateState::load_or_init(&dir.path().join("update_state.json"), "1.0.0", Default::default()).unwrap();
    assert_eq!(after.status, UpdateStatus::CheckFailed);
}

#[tokio::test]
async fn updates_disabled_skips_without_touching_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = minimal_config("  enabled: false");
    let ctrl = controller(dir.path(), config);

    let ran = ctrl.run(RunOptions { force: false, check_only: false }).await.unwrap();
    assert!(ran);
    assert!(!dir.path().join("update_state.json").exists(), "a skipped run never writes state");
}

#[tokio::test]
async fn apply_staged_without_a_staged_release_errors() {
    let dir = tempfile::tempdir().unwrap();
    let config = minimal_config("  enabled: true");
    let ctrl = controller(dir.path(), config);

    UpdateState::new("1.0.0", Default::default())
        .save(&dir.path().join("update_state.json"))
        .unwrap();

    let result = ctrl.apply_staged().await;
    assert!(result.is_err(), "nothing was staged, so apply_staged must refuse");
}

#[tokio::test]
async fn lock_file_prevents_concurrent_runs() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path: PathBuf = dir.path().join("updater.lock");
    std::fs::create_dir_all(&dir.path().join("updates")).unwrap();

    use fs2::FileExt;
    let held = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .open(&lock_path)
        .unwrap();
    held.lock_exclusive().unwrap();

    let config = minimal_config("  enabled: false");
    let ctrl = controller(dir.path(), config);
    let ran = ctrl.run(RunOptions { force: false, check_only: false }).await.unwrap();
    assert!(!ran, "a held lock must make run() report Ok(false) rather than block");

    drop(held);
}

#[test]
fn release_channel_defaults_to_stable_when_omitted() {
    let config = minimal_config("  enabled: true");
    match config.updates.channel {
        sai_cam::config::ReleaseChannel::Stable => {}
        other => panic!("expected Stable, got {other:?}"),
    }
    let _: Value = serde_yaml::to_value(&config.updates).unwrap();
}
