// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Crate-wide error taxonomy.
//!
//! Categorized along the recovery axis the capture coordinator and
//! upload worker dispatch on: transient failures feed the camera state
//! tracker's backoff, permanent failures are surfaced and never
//! retried, fatal failures abort the process at startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaiCamError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera '{id}' device not found")]
    DeviceNotFound { id: String },

    #[error("Camera '{id}' device busy")]
    DeviceBusy { id: String },

    #[error("Camera '{id}' unreachable: {reason}")]
    Unreachable { id: String, reason: String },

    #[error("Camera '{id}' authentication failed: {reason}")]
    CameraAuth { id: String, reason: String },

    #[error("Camera '{id}' codec error: {reason}")]
    Codec { id: String, reason: String },

    #[error("Camera '{id}' timed out waiting for a frame")]
    CaptureTimeout { id: String },

    #[error("Camera '{id}' has no matching ONVIF media profile")]
    NoProfile { id: String },

    #[error("Camera '{id}' HTTP error: {status}")]
    HttpError { id: String, status: u16 },

    #[error("Camera '{id}' produced an invalid frame: {reason}")]
    InvalidFrame { id: String, reason: String },

    #[error("Camera '{id}' not found")]
    CameraNotFound { id: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Disk full: {0}")]
    DiskFull(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Server rejected upload permanently (HTTP {status}): {body}")]
    UploadPermanent { status: u16, body: String },

    #[error("Update error: {0}")]
    Update(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SaiCamError>;

/// Coarse recovery category computed from a [`SaiCamError`], so the
/// capture coordinator and upload worker can dispatch on recoverability
/// without matching every variant at each call site.
///
/// Replaces exception-driven control flow from the source implementation:
/// every fallible operation on the capture path returns one of these
/// instead of relying on a caught exception's class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recoverability {
    /// Retry with backoff; tracked by the state machine.
    Transient,
    /// Never retry until config reload or operator action.
    Permanent,
    /// Cannot continue at all; process must exit.
    Fatal,
}

impl SaiCamError {
    pub fn recoverability(&self) -> Recoverability {
        use SaiCamError::*;
        match self {
            Unreachable { .. }
            | CaptureTimeout { .. }
            | Codec { .. }
            | DeviceBusy { .. }
            | Io(_)
            | HttpError { .. }
            | CameraNotFound { .. }
            | InvalidFrame { .. }
            | Storage(_)
            | DiskFull(_)
            | Upload(_)
            | Update(_)
            | Json(_) => Recoverability::Transient,

            CameraAuth { .. } | NoProfile { .. } | DeviceNotFound { .. } | UploadPermanent { .. } => {
                Recoverability::Permanent
            }

            Config(_) | Yaml(_) => Recoverability::Fatal,
        }
    }
}
