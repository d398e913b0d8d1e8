// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Single upload worker draining the upload queue.
//!
//! Retryable failures (network error, 5xx, 429) are re-enqueued with an
//! incremented attempt counter up to `upload_max_attempts`; beyond that
//! the file is left in `pending/` and picked up again by the next
//! restart's rehydrate scan rather than being declared failed. Only a
//! genuine 4xx (other than 429) is permanent.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{AdvancedConfig, ServerConfig};
use crate::storage::layout::{self, PendingRef};
use crate::storage::StorageManager;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct UploadWorker {
    client: Client,
    server: ServerConfig,
    backoff_schedule: Vec<Duration>,
    max_attempts: u32,
    storage: Arc<StorageManager>,
}

impl UploadWorker {
    pub fn new(server: ServerConfig, advanced: &AdvancedConfig, storage: Arc<StorageManager>) -> Self {
        let client = Client::builder()
            .timeout(server.timeout())
            .danger_accept_invalid_certs(!server.ssl_verify)
            .build()
            .expect("reqwest client builds with static TLS config");

        Self {
            client,
            server,
            backoff_schedule: advanced
                .upload_backoff_secs
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            max_attempts: advanced.upload_max_attempts,
            storage,
        }
    }

    /// Drain the queue until cancellation; honors a bounded grace period
    /// before abandoning any in-flight item (it remains in `pending/`).
    pub async fn run(&self, mut rx: mpsc::Receiver<PendingRef>, requeue: mpsc::Sender<PendingRef>, cancel: CancellationToken) {
        info!("upload worker started");
        loop {
            let next = tokio::select! {
                item = rx.recv() => item,
                _ = cancel.cancelled() => None,
            };

            let Some(pending_ref) = next else {
                break;
            };

            let outcome = tokio::select! {
                result = self.upload_once(&pending_ref) => result,
                _ = tokio::time::sleep(SHUTDOWN_GRACE), if cancel.is_cancelled() => {
                    warn!(camera = pending_ref.camera_id, file = pending_ref.filename, "shutdown grace period elapsed, abandoning in-flight upload");
                    continue;
                }
            };

            match outcome {
                UploadOutcome::Success => {
                    if let Err(e) = self.storage.mark_uploaded(&pending_ref) {
                        warn!(error = %e, "mark_uploaded failed after successful upload");
                    }
                }
                UploadOutcome::Permanent(status) => {
                    warn!(
                        camera = pending_ref.camera_id,
                        file = pending_ref.filename,
                        status,
                        "upload rejected permanently"
                    );
                    if let Err(e) = self.storage.mark_failed_permanent(&pending_ref) {
                        warn!(error = %e, "mark_failed_permanent failed");
                    }
                }
                UploadOutcome::Retryable(reason) => {
                    let attempts = pending_ref.attempts + 1;
                    if attempts >= self.max_attempts {
                        warn!(
                            camera = pending_ref.camera_id,
                            file = pending_ref.filename,
                            attempts,
                            reason,
                            "max upload attempts reached, leaving in pending/ for next restart"
                        );
                        continue;
                    }
                    let backoff = self.backoff_for(attempts);
                    warn!(
                        camera = pending_ref.camera_id,
                        file = pending_ref.filename,
                        attempts,
                        backoff_secs = backoff.as_secs(),
                        reason,
                        "upload failed, retrying"
                    );
                    let mut retried = pending_ref.clone();
                    retried.attempts = attempts;
                    let requeue = requeue.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(backoff).await;
                        let _ = requeue.send(retried).await;
                    });
                }
            }

            if cancel.is_cancelled() {
                break;
            }
        }
        info!("upload worker stopped");
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let idx = (attempt.saturating_sub(1) as usize).min(self.backoff_schedule.len().saturating_sub(1));
        self.backoff_schedule.get(idx).copied().unwrap_or(Duration::from_secs(1))
    }

    async fn upload_once(&self, pending_ref: &PendingRef) -> UploadOutcome {
        let captured_at = chrono::Utc::now();
        let image_path = layout::pending_image_path(
            self.storage.root(),
            &pending_ref.camera_id,
            captured_at,
            &pending_ref.filename,
        );
        // `pending_image_path` needs the actual capture date for the
        // directory component; fall back to a scan if today's guess
        // misses (captures near midnight, or uploads retried after
        // day rollover).
        let image_path = if image_path.exists() {
            image_path
        } else {
            match find_in_pending(self.storage.root(), &pending_ref.camera_id, &pending_ref.filename) {
                Some(p) => p,
                None => return UploadOutcome::Retryable("source file not found".into()),
            }
        };

        let meta_path = layout::pending_metadata_path(self.storage.root(), &pending_ref.filename);

        let jpeg = match tokio::fs::read(&image_path).await {
            Ok(bytes) => bytes,
            Err(e) => return UploadOutcome::Retryable(format!("reading image: {e}")),
        };
        let meta_bytes = tokio::fs::read(&meta_path).await.unwrap_or_default();

        let mut form = reqwest::multipart::Form::new().part(
            "image",
            reqwest::multipart::Part::bytes(jpeg).file_name(pending_ref.filename.clone()),
        );
        if !meta_bytes.is_empty() {
            form = form.part(
                "metadata",
                reqwest::multipart::Part::bytes(meta_bytes)
                    .mime_str("application/json")
                    .unwrap_or_else(|_| reqwest::multipart::Part::text("")),
            );
        }

        let mut req = self.client.post(&self.server.url).multipart(form);
        if !self.server.auth_token.is_empty() {
            req = req.bearer_auth(&self.server.auth_token);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => return UploadOutcome::Retryable(e.to_string()),
        };

        let status = resp.status();
        if status.is_success() {
            UploadOutcome::Success
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            UploadOutcome::Retryable(format!("HTTP {status}"))
        } else if status.is_client_error() {
            UploadOutcome::Permanent(status.as_u16())
        } else {
            UploadOutcome::Retryable(format!("unexpected HTTP {status}"))
        }
    }
}

enum UploadOutcome {
    Success,
    Retryable(String),
    Permanent(u16),
}

fn find_in_pending(root: &Path, camera_id: &str, filename: &str) -> Option<std::path::PathBuf> {
    let camera_dir = root.join("pending").join(camera_id);
    for entry in std::fs::read_dir(&camera_dir).ok()? {
        let date_dir = entry.ok()?.path();
        let candidate = date_dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}
