// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-camera capture worker.
//!
//! Single-threaded, cooperative loop: within one camera, captures are
//! strictly serialized; across cameras, there is no ordering guarantee.
//! A capture for one camera must never block another by more than one
//! polling interval, so every step here is either fast or itself
//! `.await`-yielding.

use std::sync::Arc;
use std::time::Duration;

use image::{ImageBuffer, Rgb};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::camera::driver::{validate_frame, CameraDriver};
use crate::camera::tracker::CameraStateTracker;
use crate::config::CameraSpec;
use crate::health::registry::CameraHealthRegistry;
use crate::logging::LogDeduper;
use crate::storage::layout::{Metadata, PendingRef};
use crate::storage::StorageManager;

use super::command::CameraCommand;

pub struct WorkerContext {
    pub device_id: String,
    pub polling_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub health_registry: CameraHealthRegistry,
    pub commands: mpsc::Receiver<CameraCommand>,
}

/// Runs one camera's capture loop until `cancel` fires, or until a
/// `Restart` command is received. Returns only on cancellation,
/// commanded restart, or an unrecoverable panic-worthy condition
/// (neither of the latter two this function itself produces — the
/// coordinator's supervision tick is what notices a dead task).
pub async fn run(
    spec: CameraSpec,
    mut driver: Box<dyn CameraDriver>,
    storage: Arc<StorageManager>,
    upload_tx: mpsc::Sender<PendingRef>,
    mut ctx: WorkerContext,
    cancel: CancellationToken,
) {
    let mut tracker = CameraStateTracker::new(Duration::from_secs(spec.capture_interval_seconds));
    let dedup = LogDeduper::default();
    let position = Arc::new(RwLock::new(spec.position.clone()));

    info!(camera = spec.id, "capture worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let mut force_capture = false;
        while let Ok(cmd) = ctx.commands.try_recv() {
            match cmd {
                CameraCommand::ForceCapture => force_capture = true,
                CameraCommand::Restart => {
                    info!(camera = spec.id, "restart requested, exiting worker loop");
                    driver.cleanup().await;
                    return;
                }
                CameraCommand::SetPosition(new_position) => {
                    info!(camera = spec.id, position = new_position, "position updated");
                    *position.write() = new_position;
                }
            }
        }

        if !force_capture && !tracker.should_attempt_capture() {
            let _ = driver.keep_alive().await;
            ctx.health_registry.publish(&spec.id, tracker.snapshot());
            tokio::select! {
                _ = tokio::time::sleep(ctx.polling_interval) => {}
                Some(cmd) = ctx.commands.recv() => {
                    if matches!(cmd, CameraCommand::Restart) {
                        driver.cleanup().await;
                        return;
                    }
                }
                _ = cancel.cancelled() => break,
            }
            continue;
        }

        match driver.capture_frame().await {
            Ok(frame) => {
                tracker.record_success();

                match validate_frame(&frame) {
                    Ok(validation) if validation.out_of_range => {
                        if dedup.should_emit(&format!("camera:{}:luminance", spec.id)) {
                            warn!(
                                camera = spec.id,
                                luminance = validation.mean_luminance,
                                "frame luminance out of normal range, keeping anyway"
                            );
                        }
                        store_frame(
                            &spec,
                            &ctx.device_id,
                            &position,
                            &frame,
                            validation.mean_luminance,
                            true,
                            &storage,
                            &upload_tx,
                        )
                        .await;
                    }
                    Ok(validation) => {
                        store_frame(
                            &spec,
                            &ctx.device_id,
                            &position,
                            &frame,
                            validation.mean_luminance,
                            false,
                            &storage,
                            &upload_tx,
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(camera = spec.id, error = %e, "captured frame failed validation");
                    }
                }
            }
            Err(e) => {
                if dedup.should_emit(&format!("camera:{}:capture_failed", spec.id)) {
                    warn!(camera = spec.id, error = %e, "capture failed");
                }
                tracker.record_failure(e.to_string());

                if tracker.reconnect_warranted() {
                    reconnect_with_backoff(&spec, driver.as_mut(), &ctx, &cancel).await;
                }
            }
        }

        ctx.health_registry.publish(&spec.id, tracker.snapshot());

        tokio::select! {
            _ = tokio::time::sleep(ctx.polling_interval) => {}
            _ = cancel.cancelled() => break,
        }
    }

    driver.cleanup().await;
    info!(camera = spec.id, "capture worker stopped");
}

async fn store_frame(
    spec: &CameraSpec,
    device_id: &str,
    position: &Arc<RwLock<String>>,
    frame: &crate::camera::driver::RawFrame,
    mean_luminance: f64,
    out_of_range: bool,
    storage: &Arc<StorageManager>,
    upload_tx: &mpsc::Sender<PendingRef>,
) {
    let Some(buf) = ImageBuffer::<Rgb<u8>, _>::from_raw(frame.width, frame.height, frame.data.clone())
    else {
        warn!(camera = spec.id, "frame buffer size mismatch, dropping capture");
        return;
    };

    let mut jpeg_bytes = Vec::new();
    if let Err(e) = buf.write_to(&mut std::io::Cursor::new(&mut jpeg_bytes), image::ImageFormat::Jpeg) {
        warn!(camera = spec.id, error = %e, "JPEG encode failed, dropping capture");
        return;
    }

    let metadata = Metadata {
        device_id: device_id.to_string(),
        camera_id: spec.id.clone(),
        captured_at: chrono::Utc::now(),
        width: frame.width,
        height: frame.height,
        mean_luminance,
        luminance_out_of_range: out_of_range,
        position: position.read().clone(),
        cpu_pct: None,
        mem_pct: None,
    };

    match storage.store(&jpeg_bytes, metadata) {
        Ok(pending_ref) => {
            if upload_tx.send(pending_ref).await.is_err() {
                debug!(camera = spec.id, "upload queue closed, capture stays in pending/");
            }
        }
        Err(e) => {
            warn!(camera = spec.id, error = %e, "failed to store captured frame");
        }
    }
}

async fn reconnect_with_backoff(
    spec: &CameraSpec,
    driver: &mut dyn CameraDriver,
    ctx: &WorkerContext,
    cancel: &CancellationToken,
) {
    let max_attempts = if ctx.max_reconnect_attempts == 0 {
        u32::MAX
    } else {
        ctx.max_reconnect_attempts
    };

    let mut attempt = 0u32;
    while attempt < max_attempts {
        if cancel.is_cancelled() {
            return;
        }
        match driver.reconnect(spec).await {
            Ok(()) => {
                info!(camera = spec.id, attempt, "reconnect succeeded");
                return;
            }
            Err(e) => {
                attempt += 1;
                warn!(camera = spec.id, attempt, error = %e, "reconnect attempt failed");
                tokio::select! {
                    _ = tokio::time::sleep(ctx.reconnect_delay * attempt) => {}
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }
    warn!(camera = spec.id, "max reconnect attempts reached, will retry on next scheduled tick");
}
