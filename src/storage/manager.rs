// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Storage manager: atomic writes into `pending/`, promotion to
//! `uploaded/`, and retention/disk-pressure cleanup.
//!
//! `cleanup()`'s missing-file handling is deliberately lenient: the
//! historical Python implementation emitted hundreds of megabytes/day of
//! error-level log spam when its own cleanup pass raced with a prior
//! deletion of the same file. A missing file during cleanup is expected,
//! not exceptional.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::error::{Result, SaiCamError};
use crate::logging::LogDeduper;
use crate::storage::layout::{
    self, CapturedImage, Metadata, PendingRef, UploadStatus,
};

pub struct StorageManager {
    root: PathBuf,
    max_size_bytes: u64,
    cleanup_threshold_bytes: u64,
    retention: Duration,
    dedup: LogDeduper,
}

impl StorageManager {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let root = config.base_path.clone();
        for sub in ["pending", "pending/metadata", "uploaded", "uploaded/metadata"] {
            std::fs::create_dir_all(root.join(sub))
                .map_err(|e| SaiCamError::Storage(format!("creating {sub}: {e}")))?;
        }
        Ok(Self {
            root,
            max_size_bytes: config.max_size_gb * 1024 * 1024 * 1024,
            cleanup_threshold_bytes: config.cleanup_threshold_gb * 1024 * 1024 * 1024,
            retention: Duration::from_secs(config.retention_days * 86_400),
            dedup: LogDeduper::default(),
        })
    }

    /// Write the JPEG and its metadata sidecar atomically (write-temp,
    /// rename) into `pending/`. Returns a reference the upload queue can
    /// enqueue.
    pub fn store(&self, jpeg: &[u8], metadata: Metadata) -> Result<PendingRef> {
        if self.free_bytes()? < jpeg.len() as u64 {
            return Err(SaiCamError::DiskFull(format!(
                "insufficient free space for {} bytes",
                jpeg.len()
            )));
        }

        let filename = CapturedImage::file_name(&metadata.camera_id, metadata.captured_at);
        let image_path = layout::pending_image_path(
            &self.root,
            &metadata.camera_id,
            metadata.captured_at,
            &filename,
        );
        let meta_path = layout::pending_metadata_path(&self.root, &filename);

        std::fs::create_dir_all(image_path.parent().unwrap())
            .map_err(|e| SaiCamError::Storage(e.to_string()))?;

        atomic_write(&image_path, jpeg)?;
        let meta_json = serde_json::to_vec_pretty(&metadata)?;
        atomic_write(&meta_path, &meta_json)?;

        Ok(PendingRef {
            camera_id: metadata.camera_id,
            filename,
            attempts: 0,
        })
    }

    /// Move the image and sidecar from `pending/` to `uploaded/`.
    /// Idempotent: a missing source (already moved by a racing call, or
    /// already cleaned up) is logged at debug and treated as success.
    pub fn mark_uploaded(&self, pending_ref: &PendingRef) -> Result<()> {
        let captured_at = captured_at_from_filename(&pending_ref.filename).unwrap_or_else(Utc::now);

        let src_image = layout::pending_image_path(
            &self.root,
            &pending_ref.camera_id,
            captured_at,
            &pending_ref.filename,
        );
        let src_meta = layout::pending_metadata_path(&self.root, &pending_ref.filename);
        let dst_image = layout::uploaded_image_path(
            &self.root,
            &pending_ref.camera_id,
            captured_at,
            &pending_ref.filename,
        );
        let dst_meta = layout::uploaded_metadata_path(&self.root, &pending_ref.filename);

        std::fs::create_dir_all(dst_image.parent().unwrap())
            .map_err(|e| SaiCamError::Storage(e.to_string()))?;

        move_if_present(&src_image, &dst_image)?;
        move_if_present(&src_meta, &dst_meta)?;
        Ok(())
    }

    /// Mark a pending file as permanently failed by rewriting its
    /// sidecar's status; the image stays in `pending/` until retention
    /// deletes it, since the operator may still want to inspect it.
    pub fn mark_failed_permanent(&self, pending_ref: &PendingRef) -> Result<()> {
        let meta_path = layout::pending_metadata_path(&self.root, &pending_ref.filename);
        let raw = match std::fs::read(&meta_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(SaiCamError::Storage(e.to_string())),
        };
        let mut value: serde_json::Value = serde_json::from_slice(&raw)?;
        value["upload_status"] = serde_json::json!(UploadStatus::FailedPermanent);
        atomic_write(&meta_path, &serde_json::to_vec_pretty(&value)?)?;
        Ok(())
    }

    /// Hourly retention + disk-pressure cleanup. Deletes oldest-first in
    /// `uploaded/` and `pending/` once older than `retention_days`, and
    /// runs an extra disk-pressure pass back down to `cleanup_threshold_gb`
    /// once total usage exceeds the `max_size_gb` cap.
    pub fn cleanup(&self) -> Result<()> {
        let cutoff = SystemTime::now() - self.retention;
        for sub in ["uploaded", "pending"] {
            self.delete_older_than(&self.root.join(sub), cutoff)?;
        }

        let total = self.total_bytes()?;
        if total > self.max_size_bytes {
            self.delete_oldest_until(self.cleanup_threshold_bytes)?;
        }
        Ok(())
    }

    fn delete_older_than(&self, dir: &Path, cutoff: SystemTime) -> Result<()> {
        for entry in walk_files(dir)? {
            let meta = match std::fs::metadata(&entry) {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %entry.display(), error = %e, "cleanup: stat failed");
                    continue;
                }
            };
            let modified = meta.modified().unwrap_or(SystemTime::now());
            if modified < cutoff {
                self.remove_file_lenient(&entry);
            }
        }
        Ok(())
    }

    fn delete_oldest_until(&self, target_bytes: u64) -> Result<()> {
        let mut files: Vec<(PathBuf, SystemTime, u64)> = Vec::new();
        for sub in ["uploaded", "pending"] {
            for path in walk_files(&self.root.join(sub))? {
                if let Ok(meta) = std::fs::metadata(&path) {
                    files.push((
                        path,
                        meta.modified().unwrap_or(SystemTime::now()),
                        meta.len(),
                    ));
                }
            }
        }
        files.sort_by_key(|(_, modified, _)| *modified);

        let mut total = self.total_bytes()?;
        for (path, _, size) in files {
            if total <= target_bytes {
                break;
            }
            self.remove_file_lenient(&path);
            total = total.saturating_sub(size);
        }
        Ok(())
    }

    fn remove_file_lenient(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.dedup.should_emit("cleanup:missing_file") {
                    debug!(path = %path.display(), "cleanup: file already gone");
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cleanup: removal failed");
            }
        }
    }

    pub fn total_bytes(&self) -> Result<u64> {
        let mut total = 0u64;
        for sub in ["uploaded", "pending"] {
            for path in walk_files(&self.root.join(sub))? {
                if let Ok(meta) = std::fs::metadata(&path) {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }

    fn free_bytes(&self) -> Result<u64> {
        fs2::available_space(&self.root).map_err(|e| SaiCamError::Storage(e.to_string()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List captured images for one camera across both `pending/` and
    /// `uploaded/`, newest first, by reading each sidecar's metadata.
    pub fn list_pending(&self, camera_id: &str) -> Result<Vec<CapturedImage>> {
        let mut images = Vec::new();
        for sub in ["pending", "uploaded"] {
            let camera_dir = self.root.join(sub).join(camera_id);
            for path in walk_files(&camera_dir)? {
                if path.extension().and_then(|e| e.to_str()) != Some("jpg") {
                    continue;
                }
                let filename = match path.file_name().and_then(|n| n.to_str()) {
                    Some(n) => n.to_string(),
                    None => continue,
                };
                let meta_path = if sub == "pending" {
                    layout::pending_metadata_path(&self.root, &filename)
                } else {
                    layout::uploaded_metadata_path(&self.root, &filename)
                };
                let metadata: Metadata = match std::fs::read(&meta_path) {
                    Ok(raw) => match serde_json::from_slice(&raw) {
                        Ok(m) => m,
                        Err(_) => continue,
                    },
                    Err(_) => continue,
                };
                let captured_at = captured_at_from_filename(&filename).unwrap_or(metadata.captured_at);
                images.push(CapturedImage {
                    camera_id: camera_id.to_string(),
                    captured_at,
                    filename,
                    metadata,
                });
            }
        }
        images.sort_by_key(|i| std::cmp::Reverse(i.captured_at));
        Ok(images)
    }
}

fn move_if_present(src: &Path, dst: &Path) -> Result<()> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %src.display(), "mark_uploaded: source already moved");
            Ok(())
        }
        Err(e) => Err(SaiCamError::Storage(e.to_string())),
    }
}

fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));
    {
        use std::io::Write;
        let mut f = std::fs::File::create(&tmp).map_err(|e| SaiCamError::Storage(e.to_string()))?;
        f.write_all(contents)
            .map_err(|e| SaiCamError::Storage(e.to_string()))?;
        f.sync_all().map_err(|e| SaiCamError::Storage(e.to_string()))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| SaiCamError::Storage(e.to_string()))?;
    Ok(())
}

fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(SaiCamError::Storage(e.to_string())),
        };
        for entry in entries {
            let entry = entry.map_err(|e| SaiCamError::Storage(e.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    Ok(out)
}

fn captured_at_from_filename(filename: &str) -> Option<chrono::DateTime<Utc>> {
    let stem = filename.strip_suffix(".jpg")?;
    let ts = stem.rsplit_once('_')?.1;
    chrono::NaiveDateTime::parse_from_str(ts, "%Y%m%dT%H%M%S%.3fZ")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(dir: &Path) -> StorageConfig {
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
            captured_at: Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap(),
            width: 1920,
            height: 1080,
            mean_luminance: 120.0,
            luminance_out_of_range: false,
            position: "front".into(),
            cpu_pct: Some(10.0),
            mem_pct: Some(20.0),
        }
    }

    #[test]
    fn store_then_mark_uploaded_moves_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = StorageManager::new(&config(dir.path())).unwrap();
        let pending = mgr.store(b"jpegbytes", sample_metadata("cam1")).unwrap();

        let pending_img = layout::pending_image_path(
            dir.path(),
            "cam1",
            Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap(),
            &pending.filename,
        );
        assert!(pending_img.exists());

        mgr.mark_uploaded(&pending).unwrap();
        assert!(!pending_img.exists());
    }

    #[test]
    fn mark_uploaded_on_missing_source_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = StorageManager::new(&config(dir.path())).unwrap();
        let pending_ref = PendingRef {
            camera_id: "cam1".into(),
            filename: "cam1_20260728T120000.000Z.jpg".into(),
            attempts: 0,
        };
        assert!(mgr.mark_uploaded(&pending_ref).is_ok());
    }

    #[test]
    fn cleanup_removes_files_older_than_retention() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.retention_days = 1;
        let mgr = StorageManager::new(&cfg).unwrap();

        let old_dir = dir.path().join("uploaded/cam1/2020-01-01");
        std::fs::create_dir_all(&old_dir).unwrap();
        let old_file = old_dir.join("cam1_old.jpg");
        std::fs::write(&old_file, b"x").unwrap();
        let ancient = SystemTime::now() - Duration::from_secs(365 * 86_400);
        filetime::set_file_mtime(&old_file, filetime::FileTime::from_system_time(ancient))
            .unwrap();

        mgr.cleanup().unwrap();
        assert!(!old_file.exists());
    }

    #[test]
    fn cleanup_shrinks_to_cleanup_threshold_not_max_size() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = StorageManager {
            root: dir.path().to_path_buf(),
            max_size_bytes: 50,
            cleanup_threshold_bytes: 20,
            retention: Duration::from_secs(7 * 86_400),
            dedup: LogDeduper::default(),
        };
        for sub in ["pending", "pending/metadata", "uploaded", "uploaded/metadata"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }

        let cam_dir = dir.path().join("uploaded/cam1/2026-07-28");
        std::fs::create_dir_all(&cam_dir).unwrap();
        for i in 0..6 {
            let f = cam_dir.join(format!("cam1_{i}.jpg"));
            std::fs::write(&f, vec![b'x'; 10]).unwrap();
            let mtime = SystemTime::now() - Duration::from_secs((6 - i) * 3600);
            filetime::set_file_mtime(&f, filetime::FileTime::from_system_time(mtime)).unwrap();
        }
        assert_eq!(mgr.total_bytes().unwrap(), 60);

        mgr.cleanup().unwrap();

        let remaining = mgr.total_bytes().unwrap();
        assert!(
            remaining <= 20,
            "disk-pressure cleanup must shrink back down to cleanup_threshold_gb, not just under max_size_gb; got {remaining} bytes remaining"
        );
    }
}
