// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Health snapshot types. Computed on demand from cached samples, never
//! persisted.

use serde::Serialize;

use crate::camera::tracker::TrackerSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub cpu_pct: f32,
    pub mem_pct: f32,
    pub disk_pct: f32,
    pub temperature_celsius: Option<f32>,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraHealth {
    pub id: String,
    pub state: crate::camera::tracker::CameraState,
    pub thread_alive: bool,
    pub last_success_age_secs: Option<u64>,
    pub last_error: Option<String>,
}

impl CameraHealth {
    pub fn from_tracker(id: &str, thread_alive: bool, snapshot: &TrackerSnapshot) -> Self {
        Self {
            id: id.to_string(),
            state: snapshot.state,
            thread_alive,
            last_success_age_secs: snapshot.last_success_age_secs,
            last_error: snapshot.last_error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub system: SystemMetrics,
    pub cameras: Vec<CameraHealth>,
    pub thread_count: usize,
    pub storage_total_bytes: u64,
    pub upload_backlog: usize,
    /// True once this snapshot is older than 2x its refresh interval;
    /// set by the IPC server at serve time, not by the monitor.
    #[serde(default)]
    pub stale: bool,
}
