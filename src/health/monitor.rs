// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Background health sampler.
//!
//! Two independent loops write into one cached [`HealthSnapshot`]: a
//! slow loop (default 300 s) samples system metrics, which are
//! comparatively expensive to gather; a fast loop (1 s) rebuilds the
//! per-camera view from [`CameraHealthRegistry`], which is cheap. The
//! IPC server only ever reads the cache, never blocks on either loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sysinfo::{ComponentExt, DiskExt, System, SystemExt};
use tokio_util::sync::CancellationToken;

use crate::health::registry::CameraHealthRegistry;
use crate::health::snapshot::{CameraHealth, HealthSnapshot, SystemMetrics};
use crate::storage::StorageManager;

const CAMERA_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
const LIVENESS_WINDOW: Duration = Duration::from_secs(30);

pub struct HealthCache {
    inner: RwLock<HealthSnapshot>,
    last_refreshed: RwLock<Instant>,
    refresh_interval: Duration,
}

impl HealthCache {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            inner: RwLock::new(HealthSnapshot {
                system: SystemMetrics {
                    cpu_pct: 0.0,
                    mem_pct: 0.0,
                    disk_pct: 0.0,
                    temperature_celsius: None,
                    uptime_secs: 0,
                },
                cameras: Vec::new(),
                thread_count: 0,
                storage_total_bytes: 0,
                upload_backlog: 0,
                stale: false,
            }),
            last_refreshed: RwLock::new(Instant::now()),
            refresh_interval,
        }
    }

    /// Read the cached snapshot, flagging `stale` if it hasn't been
    /// refreshed within 2x its nominal refresh interval.
    pub fn read(&self) -> HealthSnapshot {
        let mut snap = self.inner.read().clone();
        snap.stale = self.last_refreshed.read().elapsed() > self.refresh_interval * 2;
        snap
    }

    fn write_system(&self, system: SystemMetrics) {
        self.inner.write().system = system;
        *self.last_refreshed.write() = Instant::now();
    }

    fn write_cameras(&self, cameras: Vec<CameraHealth>, thread_count: usize) {
        let mut guard = self.inner.write();
        guard.cameras = cameras;
        guard.thread_count = thread_count;
    }

    fn write_storage(&self, total_bytes: u64, backlog: usize) {
        let mut guard = self.inner.write();
        guard.storage_total_bytes = total_bytes;
        guard.upload_backlog = backlog;
    }
}

pub struct HealthMonitor {
    cache: Arc<HealthCache>,
    registry: CameraHealthRegistry,
    storage: Arc<StorageManager>,
    upload_backlog_rx: Option<tokio::sync::watch::Receiver<usize>>,
    system_refresh_interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        registry: CameraHealthRegistry,
        storage: Arc<StorageManager>,
        system_refresh_interval: Duration,
        upload_backlog_rx: Option<tokio::sync::watch::Receiver<usize>>,
    ) -> (Self, Arc<HealthCache>) {
        let cache = Arc::new(HealthCache::new(system_refresh_interval));
        (
            Self {
                cache: cache.clone(),
                registry,
                storage,
                upload_backlog_rx,
                system_refresh_interval,
            },
            cache,
        )
    }

    pub fn cache(&self) -> Arc<HealthCache> {
        self.cache.clone()
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut sys = System::new_all();
        let started_at = Instant::now();

        let slow = {
            let cache = self.cache.clone();
            let interval = self.system_refresh_interval;
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    sys.refresh_cpu();
                    sys.refresh_memory();
                    sys.refresh_disks();
                    sys.refresh_components();

                    let cpu_pct = sys.global_cpu_info().cpu_usage();
                    let mem_pct = if sys.total_memory() > 0 {
                        sys.used_memory() as f32 / sys.total_memory() as f32 * 100.0
                    } else {
                        0.0
                    };
                    let disk_pct = sys
                        .disks()
                        .iter()
                        .map(|d| {
                            let total = d.total_space();
                            if total == 0 {
                                0.0
                            } else {
                                (total - d.available_space()) as f32 / total as f32 * 100.0
                            }
                        })
                        .fold(0.0_f32, f32::max);
                    let temperature_celsius = sys
                        .components()
                        .iter()
                        .map(|c| c.temperature())
                        .fold(None, |acc: Option<f32>, t| {
                            Some(acc.map_or(t, |a| a.max(t)))
                        });

                    cache.write_system(SystemMetrics {
                        cpu_pct,
                        mem_pct,
                        disk_pct,
                        temperature_celsius,
                        uptime_secs: started_at.elapsed().as_secs(),
                    });

                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            })
        };

        let fast = {
            let cache = self.cache.clone();
            let registry = self.registry.clone();
            let storage = self.storage.clone();
            let mut backlog_rx = self.upload_backlog_rx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let entries = registry.snapshot_all(LIVENESS_WINDOW);
                    let thread_count = entries.len();
                    let cameras = entries
                        .into_iter()
                        .map(|(id, snapshot, alive)| CameraHealth::from_tracker(&id, alive, &snapshot))
                        .collect();
                    cache.write_cameras(cameras, thread_count);

                    let backlog = backlog_rx
                        .as_mut()
                        .map(|rx| *rx.borrow())
                        .unwrap_or(0);
                    let total_bytes = storage.total_bytes().unwrap_or(0);
                    cache.write_storage(total_bytes, backlog);

                    tokio::select! {
                        _ = tokio::time::sleep(CAMERA_REFRESH_INTERVAL) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            })
        };

        let _ = tokio::join!(slow, fast);
    }
}

/// Counts live items in the upload queue's backing channel; wired by
/// the agent binary via a `tokio::sync::watch` updated by the upload
/// worker each time it enqueues/dequeues, so the monitor never touches
/// the queue directly.
pub fn backlog_watch() -> (tokio::sync::watch::Sender<usize>, tokio::sync::watch::Receiver<usize>) {
    tokio::sync::watch::channel(0usize)
}
