// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Shared cache of per-camera tracker snapshots.
//!
//! Each camera's [`crate::camera::tracker::CameraStateTracker`] is owned
//! exclusively by that camera's worker task and never shared. Workers
//! publish a cheap point-in-time copy here after every capture attempt;
//! the health monitor only ever reads this registry, never a live
//! tracker — matching the message-passing discipline used throughout
//! the agent instead of shared mutable per-camera state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::camera::tracker::TrackerSnapshot;

struct Entry {
    last_heartbeat: Instant,
    snapshot: TrackerSnapshot,
}

#[derive(Clone)]
pub struct CameraHealthRegistry {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl CameraHealthRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Called by a camera worker after every capture attempt (success or
    /// failure) so liveness can be judged on heartbeat recency rather
    /// than the thread registry reaching into worker internals.
    pub fn publish(&self, camera_id: &str, snapshot: TrackerSnapshot) {
        self.inner.write().insert(
            camera_id.to_string(),
            Entry {
                last_heartbeat: Instant::now(),
                snapshot,
            },
        );
    }

    /// A camera is considered alive if it has published a heartbeat
    /// within `liveness_window`, regardless of whether that heartbeat
    /// was a success or a recorded failure.
    pub fn snapshot_all(&self, liveness_window: std::time::Duration) -> Vec<(String, TrackerSnapshot, bool)> {
        self.inner
            .read()
            .iter()
            .map(|(id, entry)| {
                let alive = entry.last_heartbeat.elapsed() < liveness_window;
                (id.clone(), entry.snapshot.clone(), alive)
            })
            .collect()
    }
}

impl Default for CameraHealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}
