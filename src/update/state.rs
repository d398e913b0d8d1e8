// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! `UpdateState`: the one artifact the updater, the agent, and the
//! portal all agree on. Only the updater writes it; the portal only
//! reads it; every write is atomic (write-temp, fsync, rename), the
//! same pattern `Config::save_to_file` and the storage manager use.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ReleaseChannel;
use crate::error::{Result, SaiCamError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    #[default]
    UpToDate,
    Updating,
    Updated,
    CheckFailed,
    FetchFailed,
    PreflightFailed,
    RollbackCompleted,
    RollbackFailed,
    RollingBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateState {
    pub status: UpdateStatus,
    pub current_version: String,
    #[serde(default)]
    pub latest_available: Option<String>,
    #[serde(default)]
    pub previous_version: Option<String>,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub channel: ReleaseChannel,
    /// Set when `updates.apply_immediately = false` staged a release
    /// without invoking the installer; cleared by `--apply-staged`.
    #[serde(default)]
    pub staged_only: bool,
}

impl UpdateState {
    pub fn new(current_version: impl Into<String>, channel: ReleaseChannel) -> Self {
        Self {
            status: UpdateStatus::UpToDate,
            current_version: current_version.into(),
            latest_available: None,
            previous_version: None,
            last_check: None,
            last_update: None,
            consecutive_failures: 0,
            channel,
            staged_only: false,
        }
    }

    pub fn load_or_init(path: &Path, current_version: &str, channel: ReleaseChannel) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(SaiCamError::Json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::new(current_version, channel))
            }
            Err(e) => Err(SaiCamError::Io(e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(SaiCamError::Io)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        let mut f = std::fs::File::create(&tmp).map_err(SaiCamError::Io)?;
        f.write_all(&json).map_err(SaiCamError::Io)?;
        f.sync_all().map_err(SaiCamError::Io)?;
        std::fs::rename(&tmp, path).map_err(SaiCamError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_init_falls_back_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update_state.json");
        let state = UpdateState::load_or_init(&path, "1.2.3", ReleaseChannel::Stable).unwrap();
        assert_eq!(state.status, UpdateStatus::UpToDate);
        assert_eq!(state.current_version, "1.2.3");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update_state.json");
        let mut state = UpdateState::new("1.2.3", ReleaseChannel::Beta);
        state.status = UpdateStatus::Updated;
        state.consecutive_failures = 1;
        state.save(&path).unwrap();

        let loaded = UpdateState::load_or_init(&path, "1.2.3", ReleaseChannel::Beta).unwrap();
        assert_eq!(loaded.status, UpdateStatus::Updated);
        assert_eq!(loaded.consecutive_failures, 1);
    }
}
