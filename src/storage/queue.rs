// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Upload queue. The in-memory queue is always a bounded channel; the
//! filesystem's `pending/` subtree is the source of truth. On restart
//! the queue is rehydrated by scanning `pending/` rather than reading
//! any separate index file — mirroring the sequential-scan rebuild the
//! global writer does for its segment index.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::info;

use crate::error::{Result, SaiCamError};
use crate::storage::layout::PendingRef;

pub const CHANNEL_DEPTH: usize = 1024;

/// Approximate backlog size from a cloned sender handle, for the health
/// monitor's `upload_backlog` field. `Sender::capacity()` reports
/// permits still available, so depth minus that is items currently
/// sitting in the channel (retries in their backoff sleep aren't
/// counted until they're re-sent).
pub fn backlog_len(sender: &mpsc::Sender<PendingRef>) -> usize {
    CHANNEL_DEPTH - sender.capacity()
}

pub struct UploadQueue {
    tx: mpsc::Sender<PendingRef>,
    rx: mpsc::Receiver<PendingRef>,
}

impl UploadQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        Self { tx, rx }
    }

    pub fn sender(&self) -> mpsc::Sender<PendingRef> {
        self.tx.clone()
    }

    pub async fn recv(&mut self) -> Option<PendingRef> {
        self.rx.recv().await
    }

    /// Hand off the receiving half to the upload worker after rehydrate.
    /// Consumes the queue: nothing else may dequeue once the worker owns it.
    pub fn into_receiver(self) -> mpsc::Receiver<PendingRef> {
        self.rx
    }

    /// Scan `pending/<camera_id>/<date>/*.jpg` and enqueue each as a
    /// [`PendingRef`]. Run once at startup before the upload worker
    /// starts draining.
    pub async fn rehydrate(&self, storage_root: &Path) -> Result<usize> {
        let pending_root = storage_root.join("pending");
        if !pending_root.exists() {
            return Ok(0);
        }

        let mut count = 0;
        let mut camera_dirs = std::fs::read_dir(&pending_root)
            .map_err(|e| SaiCamError::Storage(e.to_string()))?;

        while let Some(camera_entry) = camera_dirs.next().transpose().map_err(|e| SaiCamError::Storage(e.to_string()))? {
            let camera_path = camera_entry.path();
            if !camera_path.is_dir() {
                continue;
            }
            let camera_id = match camera_path.file_name().and_then(|n| n.to_str()) {
                Some("metadata") => continue,
                Some(name) => name.to_string(),
                None => continue,
            };

            for date_entry in walk_jpgs(&camera_path)? {
                let filename = date_entry
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                if filename.is_empty() {
                    continue;
                }
                let pending_ref = PendingRef {
                    camera_id: camera_id.clone(),
                    filename,
                    attempts: 0,
                };
                if self.tx.send(pending_ref).await.is_err() {
                    break;
                }
                count += 1;
            }
        }

        if count > 0 {
            info!(count, "upload queue rehydrated from pending/ on restart");
        }
        Ok(count)
    }
}

impl Default for UploadQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn walk_jpgs(dir: &std::path::Path) -> Result<Vec<std::path::PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| SaiCamError::Storage(e.to_string()))? {
        let entry = entry.map_err(|e| SaiCamError::Storage(e.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_jpgs(&path)?);
        } else if path.extension().and_then(|e| e.to_str()) == Some("jpg") {
            out.push(path);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rehydrate_enqueues_existing_pending_files() {
        let dir = tempfile::tempdir().unwrap();
        let cam_dir = dir.path().join("pending/cam1/2026-07-28");
        std::fs::create_dir_all(&cam_dir).unwrap();
        std::fs::write(cam_dir.join("cam1_1.jpg"), b"x").unwrap();
        std::fs::write(cam_dir.join("cam1_2.jpg"), b"x").unwrap();

        let mut queue = UploadQueue::new();
        let count = queue.rehydrate(dir.path()).await.unwrap();
        assert_eq!(count, 2);

        let first = queue.recv().await.unwrap();
        assert_eq!(first.camera_id, "cam1");
    }

    #[tokio::test]
    async fn rehydrate_on_missing_pending_dir_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let queue = UploadQueue::new();
        let count = queue.rehydrate(dir.path()).await.unwrap();
        assert_eq!(count, 0);
    }
}
