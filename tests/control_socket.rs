// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Exercises the control socket end to end: a real `ControlServer` bound
//! to a Unix socket in a tempdir, talked to with the portal's own client
//! function, standing in for the relay the portal's POST handlers do.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sai_cam::capture::CameraCommand;
use sai_cam::config::Config;
use sai_cam::control::{client, ControlReply, ControlRequest, ControlServer};

fn base_config() -> Config {
    let yaml = r#"
cameras:
  - id: cam1
    kind: usb
    connection: /dev/video0
    capture_interval_seconds: 60
    position: front
storage:
  base_path: /tmp/sai-cam-test-storage-control
device:
  id: node-1
  location: ridge-a
  description: test node
"#;
    serde_yaml::from_str(yaml).unwrap()
}

struct Harness {
    socket_path: std::path::PathBuf,
    cancel: CancellationToken,
    commands: mpsc::Receiver<CameraCommand>,
    _config_dir: tempfile::TempDir,
    config_path: std::path::PathBuf,
}

async fn start_server() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("control.sock");
    let config_path = dir.path().join("config.yaml");
    let config = base_config();
    config.save_to_file(&config_path).unwrap();

    let (tx, rx) = mpsc::channel(8);
    let mut registry = HashMap::new();
    registry.insert("cam1".to_string(), tx);
    let registry: sai_cam::capture::coordinator::CommandRegistry = Arc::new(RwLock::new(registry));

    let server = ControlServer::new(
        socket_path.clone(),
        registry,
        Arc::new(RwLock::new(config)),
        config_path.clone(),
        Arc::new(RwLock::new(false)),
    );

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = server.run(server_cancel).await;
    });

    // Give the listener a moment to bind before the first connection attempt.
    for _ in 0..50 {
        if socket_path.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    Harness {
        socket_path,
        cancel,
        commands: rx,
        _config_dir: dir,
        config_path,
    }
}

#[tokio::test]
async fn status_request_reports_device_identity() {
    let harness = start_server().await;

    let reply = client::send(&harness.socket_path, ControlRequest::Status).await.unwrap();
    match reply {
        ControlReply::Status(view) => {
            assert_eq!(view.device_id, "node-1");
            assert_eq!(view.location, "ridge-a");
            assert!(!view.wifi_ap_enabled);
        }
        other => panic!("expected Status, got {other:?}"),
    }

    harness.cancel.cancel();
}

#[tokio::test]
async fn capture_request_forwards_to_the_camera_command_channel() {
    let mut harness = start_server().await;

    let reply = client::send(&harness.socket_path, ControlRequest::Capture { camera: "cam1".into() })
        .await
        .unwrap();
    assert!(matches!(reply, ControlReply::Ok));

    let received = harness.commands.recv().await.unwrap();
    assert!(matches!(received, CameraCommand::ForceCapture));

    harness.cancel.cancel();
}

#[tokio::test]
async fn unknown_camera_id_returns_an_error_reply_not_a_dropped_connection() {
    let harness = start_server().await;

    let reply = client::send(&harness.socket_path, ControlRequest::Restart { camera: "doesnotexist".into() })
        .await
        .unwrap();
    match reply {
        ControlReply::Error { message } => assert!(message.contains("doesnotexist")),
        other => panic!("expected Error, got {other:?}"),
    }

    harness.cancel.cancel();
}

#[tokio::test]
async fn set_position_persists_to_the_config_file_and_forwards_the_command() {
    let mut harness = start_server().await;

    let reply = client::send(
        &harness.socket_path,
        ControlRequest::SetPosition { camera: "cam1".into(), position: "rear".into() },
    )
    .await
    .unwrap();
    assert!(matches!(reply, ControlReply::Ok));

    let received = harness.commands.recv().await.unwrap();
    assert!(matches!(received, CameraCommand::SetPosition(p) if p == "rear"));

    let persisted = Config::from_file(&harness.config_path).unwrap();
    assert_eq!(persisted.cameras[0].position, "rear");

    harness.cancel.cancel();
}
