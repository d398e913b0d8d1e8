// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! End-to-end exercise of storage → queue → upload against a real (if
//! tiny) HTTP endpoint, standing in for the ingest server. The endpoint
//! is an `axum` router, the same crate the portal itself serves on, so
//! no extra HTTP-mocking dependency is pulled in just for tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sai_cam::config::{AdvancedConfig, ServerConfig, StorageConfig};
use sai_cam::storage::layout::Metadata;
use sai_cam::storage::StorageManager;
use sai_cam::upload::UploadWorker;

async fn spawn_fake_ingest(fail_times: u32) -> (String, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();

    let app = Router::new().route(
        "/ingest",
        post(move || {
            let counter = counter.clone();
            async move {
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                if seen < fail_times {
                    axum::http::StatusCode::SERVICE_UNAVAILABLE
                } else {
                    axum::http::StatusCode::OK
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/ingest"), hits)
}

fn storage_config(dir: &std::path::Path) -> StorageConfig {
    StorageConfig {
        base_path: dir.to_path_buf(),
        max_size_gb: 10,
        cleanup_threshold_gb: 8,
        retention_days: 7,
    }
}

fn sample_metadata(camera_id: &str) -> Metadata {
    Metadata {
        device_id: "node-1".into(),
        camera_id: camera_id.into(),
        captured_at: Utc::now(),
        width: 640,
        height: 480,
        mean_luminance: 100.0,
        luminance_out_of_range: false,
        position: "front".into(),
        cpu_pct: None,
        mem_pct: None,
    }
}

#[tokio::test]
async fn happy_path_capture_to_uploaded() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(StorageManager::new(&storage_config(dir.path())).unwrap());

    let pending_ref = storage.store(b"fake-jpeg-bytes", sample_metadata("cam1")).unwrap();

    let (url, hits) = spawn_fake_ingest(0).await;
    let server = ServerConfig { url, ..Default::default() };
    let advanced = AdvancedConfig { upload_backoff_secs: vec![1], upload_max_attempts: 3, ..Default::default() };

    let worker = UploadWorker::new(server, &advanced, storage.clone());
    let (tx, rx) = mpsc::channel(8);
    let (requeue_tx, _requeue_rx) = mpsc::channel(8);
    tx.send(pending_ref.clone()).await.unwrap();
    drop(tx);

    let cancel = CancellationToken::new();
    worker.run(rx, requeue_tx, cancel).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let images = storage.list_pending("cam1").unwrap();
    assert_eq!(images.len(), 1);
}

#[tokio::test]
async fn transient_failure_is_retried_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(StorageManager::new(&storage_config(dir.path())).unwrap());
    let pending_ref = storage.store(b"fake-jpeg-bytes", sample_metadata("cam1")).unwrap();

    // Fails the first two attempts, then accepts the third.
    let (url, hits) = spawn_fake_ingest(2).await;
    let server = ServerConfig { url, ..Default::default() };
    let advanced = AdvancedConfig {
        upload_backoff_secs: vec![0, 0, 0],
        upload_max_attempts: 5,
        ..Default::default()
    };

    let worker = Arc::new(UploadWorker::new(server, &advanced, storage.clone()));
    let (tx, rx) = mpsc::channel(8);
    let (requeue_tx, mut requeue_rx) = mpsc::channel(8);
    tx.send(pending_ref).await.unwrap();

    let cancel = CancellationToken::new();

    // Forward requeued retries back into the worker's own receiver, the
    // way `agent.rs` wires the two channels together.
    let forward_tx = tx.clone();
    let forward = tokio::spawn(async move {
        while let Some(item) = requeue_rx.recv().await {
            let _ = forward_tx.send(item).await;
        }
    });
    drop(tx);

    let worker_handle = {
        let worker = worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(rx, requeue_tx, cancel).await })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while hits.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("third attempt should eventually succeed");

    cancel.cancel();
    forward.abort();
    let _ = worker_handle.await;

    let images = storage.list_pending("cam1").unwrap();
    assert_eq!(images.len(), 1, "the file should have been promoted to uploaded/ after the third attempt");
}
