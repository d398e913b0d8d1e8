// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Directory layout and record types for captured images.
//!
//! ```text
//! <root>/
//!   pending/<camera_id>/<yyyy-mm-dd>/<camera>_<timestamp>.jpg
//!   pending/metadata/<filename>.json
//!   uploaded/<camera_id>/<yyyy-mm-dd>/...
//!   uploaded/metadata/...
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    Pending,
    Uploaded,
    FailedPermanent,
}

/// Metadata sidecar written alongside every captured JPEG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub device_id: String,
    pub camera_id: String,
    pub captured_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub mean_luminance: f64,
    pub luminance_out_of_range: bool,
    pub position: String,
    #[serde(default)]
    pub cpu_pct: Option<f32>,
    #[serde(default)]
    pub mem_pct: Option<f32>,
}

/// A captured image and its metadata, addressed by filename (shared
/// between the `.jpg` and the sidecar `.json`).
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub camera_id: String,
    pub captured_at: DateTime<Utc>,
    pub filename: String,
    pub metadata: Metadata,
}

/// A reference to a file sitting in `pending/`, queued for upload.
#[derive(Debug, Clone)]
pub struct PendingRef {
    pub camera_id: String,
    pub filename: String,
    pub attempts: u32,
}

impl CapturedImage {
    pub fn file_name(camera_id: &str, captured_at: DateTime<Utc>) -> String {
        format!(
            "{camera_id}_{}.jpg",
            captured_at.format("%Y%m%dT%H%M%S%.3fZ")
        )
    }
}

pub fn pending_image_path(root: &Path, camera_id: &str, captured_at: DateTime<Utc>, filename: &str) -> PathBuf {
    root.join("pending")
        .join(camera_id)
        .join(captured_at.format("%Y-%m-%d").to_string())
        .join(filename)
}

pub fn pending_metadata_path(root: &Path, filename: &str) -> PathBuf {
    root.join("pending")
        .join("metadata")
        .join(sidecar_name(filename))
}

pub fn uploaded_image_path(root: &Path, camera_id: &str, captured_at: DateTime<Utc>, filename: &str) -> PathBuf {
    root.join("uploaded")
        .join(camera_id)
        .join(captured_at.format("%Y-%m-%d").to_string())
        .join(filename)
}

pub fn uploaded_metadata_path(root: &Path, filename: &str) -> PathBuf {
    root.join("uploaded")
        .join("metadata")
        .join(sidecar_name(filename))
}

fn sidecar_name(filename: &str) -> String {
    format!("{filename}.json")
}
