// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Capture coordinator: owns one worker task per configured camera,
//! supervises them for crashes, and runs a separate retry loop for
//! cameras that never came up.
//!
//! Workers communicate upward only by exiting (observed at the next
//! supervision tick) or by publishing to the health registry — the
//! coordinator never reaches into a worker's state, matching the
//! message-passing-over-shared-mutable-state discipline the rest of the
//! agent follows. Operator-triggered actions travel the other
//! direction over the same discipline: the coordinator hands each
//! worker a command channel at spawn time and keeps a registry of the
//! senders so the control socket can reach a live camera without ever
//! touching its tracker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::camera::{self, driver::CameraDriver};
use crate::config::{CameraSpec, Config};
use crate::error::{Result, SaiCamError};
use crate::health::registry::CameraHealthRegistry;
use crate::storage::layout::PendingRef;
use crate::storage::StorageManager;

use super::command::CameraCommand;
use super::worker::{self, WorkerContext};

const SUPERVISION_TICK: Duration = Duration::from_secs(10);
const COMMAND_CHANNEL_DEPTH: usize = 8;

struct CameraEntry {
    spec: CameraSpec,
    handle: JoinHandle<()>,
}

pub type CommandRegistry = Arc<RwLock<HashMap<String, mpsc::Sender<CameraCommand>>>>;

pub struct CaptureCoordinator {
    cameras: HashMap<String, CameraEntry>,
    storage: Arc<StorageManager>,
    upload_tx: mpsc::Sender<PendingRef>,
    device_id: String,
    polling_interval: Duration,
    reconnect_delay: Duration,
    health_registry: CameraHealthRegistry,
    command_registry: CommandRegistry,
    recovered_rx: mpsc::UnboundedReceiver<(CameraSpec, JoinHandle<()>)>,
    recovered_tx: mpsc::UnboundedSender<(CameraSpec, JoinHandle<()>)>,
    cancel: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
}

impl CaptureCoordinator {
    pub fn new(
        storage: Arc<StorageManager>,
        upload_tx: mpsc::Sender<PendingRef>,
        config: &Config,
        health_registry: CameraHealthRegistry,
    ) -> Self {
        let (recovered_tx, recovered_rx) = mpsc::unbounded_channel();
        Self {
            cameras: HashMap::new(),
            storage,
            upload_tx,
            device_id: config.device.id.clone(),
            polling_interval: Duration::from_millis(config.advanced.polling_interval_ms),
            reconnect_delay: Duration::from_secs(config.advanced.reconnect_delay_secs),
            health_registry,
            command_registry: Arc::new(RwLock::new(HashMap::new())),
            recovered_rx,
            recovered_tx,
            cancel: CancellationToken::new(),
            supervisor: None,
        }
    }

    /// Shared with the control socket so operator commands can reach a
    /// running camera worker without the coordinator brokering each one.
    pub fn command_registry(&self) -> CommandRegistry {
        self.command_registry.clone()
    }

    fn worker_context(&self, spec: &CameraSpec, commands: mpsc::Receiver<CameraCommand>) -> WorkerContext {
        WorkerContext {
            device_id: self.device_id.clone(),
            polling_interval: self.polling_interval,
            reconnect_delay: self.reconnect_delay,
            max_reconnect_attempts: spec.reconnect_attempts,
            health_registry: self.health_registry.clone(),
            commands,
        }
    }

    /// Start one worker per camera in `config`. Cameras whose driver
    /// fails initial setup are handed to a retry loop instead of a
    /// worker and join the active set once that loop succeeds.
    pub async fn start(&mut self, config: &Config) -> Result<()> {
        for spec in &config.cameras {
            self.spawn_camera(spec.clone()).await;
        }
        self.spawn_supervisor();
        Ok(())
    }

    fn register_commands(&self, camera_id: &str) -> mpsc::Receiver<CameraCommand> {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_DEPTH);
        self.command_registry.write().insert(camera_id.to_string(), tx);
        rx
    }

    async fn spawn_camera(&mut self, spec: CameraSpec) {
        let capture_timeout = Duration::from_secs(spec.capture_interval_seconds.min(30).max(5));
        let driver = match camera::build_driver(&spec, capture_timeout) {
            Ok(d) => d,
            Err(e) => {
                error!(camera = spec.id, error = %e, "cannot construct driver, starting retry loop");
                self.spawn_retry(spec);
                return;
            }
        };

        self.spawn_with_driver(spec, driver).await;
    }

    async fn spawn_with_driver(&mut self, spec: CameraSpec, mut driver: Box<dyn CameraDriver>) {
        match driver.setup(&spec).await {
            Ok(()) => {
                let commands = self.register_commands(&spec.id);
                let ctx = self.worker_context(&spec, commands);
                let storage = self.storage.clone();
                let upload_tx = self.upload_tx.clone();
                let cancel = self.cancel.clone();
                let spec_clone = spec.clone();

                let handle = tokio::spawn(async move {
                    worker::run(spec_clone, driver, storage, upload_tx, ctx, cancel).await;
                });

                info!(camera = spec.id, "camera online");
                self.cameras.insert(spec.id.clone(), CameraEntry { spec, handle });
            }
            Err(e) => {
                error!(camera = spec.id, error = %e, "initial setup failed, entering retry loop");
                self.spawn_retry(spec);
            }
        }
    }

    /// Spawn a detached retry loop for a camera that failed to come up.
    /// On success the detached task reports the new worker back through
    /// `recovered_tx` rather than mutating `self.cameras` directly, so
    /// it can join the supervised set on the next `reap_and_respawn`.
    fn spawn_retry(&mut self, spec: CameraSpec) {
        let capture_timeout = Duration::from_secs(spec.capture_interval_seconds.min(30).max(5));
        let cancel = self.cancel.clone();
        let storage = self.storage.clone();
        let upload_tx = self.upload_tx.clone();
        let commands = self.register_commands(&spec.id);
        let ctx = self.worker_context(&spec, commands);
        let spec_for_loop = spec.clone();
        let recovered_tx = self.recovered_tx.clone();

        tokio::spawn(async move {
            let driver = super::retry::retry_until_ready(&spec_for_loop, &cancel, || {
                let spec = spec_for_loop.clone();
                async move {
                    let mut d = camera::build_driver(&spec, capture_timeout)?;
                    d.setup(&spec).await?;
                    Ok(d)
                }
            })
            .await;

            if let Some(driver) = driver {
                let spec_for_handle = spec_for_loop.clone();
                let handle = tokio::spawn(async move {
                    worker::run(spec_for_loop, driver, storage, upload_tx, ctx, cancel).await;
                });
                let _ = recovered_tx.send((spec_for_handle, handle));
            }
        });
    }

    fn spawn_supervisor(&mut self) {
        let cancel = self.cancel.clone();
        self.supervisor = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(SUPERVISION_TICK) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }));
    }

    /// Detect finished worker tasks and respawn them, and absorb any
    /// cameras that a retry loop just recovered. Call on the same tick
    /// as the supervisor's sleep (driven by the agent's main loop).
    pub async fn reap_and_respawn(&mut self) {
        while let Ok((spec, handle)) = self.recovered_rx.try_recv() {
            info!(camera = spec.id, "retry loop recovered camera, now supervised");
            self.cameras.insert(spec.id.clone(), CameraEntry { spec, handle });
        }

        let dead: Vec<String> = self
            .cameras
            .iter()
            .filter(|(_, entry)| entry.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for id in dead {
            if let Some(entry) = self.cameras.remove(&id) {
                error!(camera = id, "worker task exited unexpectedly, respawning");
                self.spawn_camera(entry.spec).await;
            }
        }
    }

    pub fn camera_ids(&self) -> Vec<String> {
        self.cameras.keys().cloned().collect()
    }

    /// Relay an operator-triggered command to a specific camera's live
    /// worker. `NoSuchCamera`-style errors surface as plain storage
    /// errors since no dedicated variant exists for "unknown camera id"
    /// at this layer — the portal's control client is expected to
    /// validate against the configured camera list first.
    pub async fn dispatch(&self, camera_id: &str, command: CameraCommand) -> Result<()> {
        let tx = {
            let guard = self.command_registry.read();
            guard.get(camera_id).cloned()
        };
        match tx {
            Some(tx) => tx.send(command).await.map_err(|_| {
                warn!(camera = camera_id, "command channel closed, camera worker may be restarting");
                SaiCamError::CameraNotFound { id: camera_id.to_string() }
            }),
            None => Err(SaiCamError::CameraNotFound { id: camera_id.to_string() }),
        }
    }

    pub async fn shutdown(self) {
        info!("capture coordinator shutting down");
        self.cancel.cancel();
        if let Some(supervisor) = self.supervisor {
            let _ = supervisor.await;
        }
        for (id, entry) in self.cameras {
            if let Err(e) = entry.handle.await {
                error!(camera = id, error = %e, "worker task join failed during shutdown");
            }
        }
    }
}
