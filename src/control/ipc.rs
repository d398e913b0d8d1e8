// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Write-capable Unix domain socket the portal uses to relay operator
//! actions back to the agent process. One request line, one JSON
//! reply, connection closed by the server — the same framing as
//! [`crate::health::ipc`], kept on a separate socket path with tighter
//! permissions (owner-only) since this one can mutate state.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::{CameraCommand, coordinator::CommandRegistry};
use crate::config::Config;
use crate::control::protocol::{AgentStatusView, ControlReply, ControlRequest};
use crate::control::wifi_ap;
use crate::error::{Result, SaiCamError};

pub struct ControlServer {
    socket_path: PathBuf,
    commands: CommandRegistry,
    config: Arc<RwLock<Config>>,
    config_path: PathBuf,
    wifi_ap_enabled: Arc<RwLock<bool>>,
    version: &'static str,
}

impl ControlServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        commands: CommandRegistry,
        config: Arc<RwLock<Config>>,
        config_path: PathBuf,
        wifi_ap_enabled: Arc<RwLock<bool>>,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            commands,
            config,
            config_path,
            wifi_ap_enabled,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(SaiCamError::Io)?;
        }
        remove_stale_socket(&self.socket_path)?;

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            SaiCamError::Storage(format!("binding control socket {}: {e}", self.socket_path.display()))
        })?;

        // Owner read/write only: unlike the health socket, a connection
        // here can restart a camera or toggle the access point, so only
        // the portal's own service user may reach it.
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))
            .map_err(SaiCamError::Io)?;

        info!(path = %self.socket_path.display(), "control socket listening");

        let shared = Arc::new(self);

        loop {
            let accept = tokio::select! {
                res = listener.accept() => res,
                _ = cancel.cancelled() => break,
            };

            let (stream, _) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "control socket accept failed");
                    continue;
                }
            };

            let server = shared.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    warn!(error = %e, "control socket connection failed");
                }
            });
        }

        let _ = std::fs::remove_file(&shared.socket_path);
        Ok(())
    }

    async fn handle_connection(&self, stream: tokio::net::UnixStream) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.map_err(SaiCamError::Io)?;

        let request: std::result::Result<ControlRequest, _> = serde_json::from_str(line.trim());
        let reply = match request {
            Ok(req) => self.dispatch(req).await,
            Err(e) => ControlReply::Error {
                message: format!("unrecognized control request: {e}"),
            },
        };

        let body = serde_json::to_vec(&reply)?;
        write_half.write_all(&body).await.map_err(SaiCamError::Io)?;
        write_half.write_all(b"\n").await.map_err(SaiCamError::Io)?;
        write_half.shutdown().await.map_err(SaiCamError::Io)?;
        Ok(())
    }

    async fn dispatch(&self, request: ControlRequest) -> ControlReply {
        match request {
            ControlRequest::Capture { camera } => self.send_camera_command(&camera, CameraCommand::ForceCapture).await,
            ControlRequest::Restart { camera } => self.send_camera_command(&camera, CameraCommand::Restart).await,
            ControlRequest::SetPosition { camera, position } => self.set_position(&camera, position).await,
            ControlRequest::WifiApEnable => self.toggle_wifi_ap(true).await,
            ControlRequest::WifiApDisable => self.toggle_wifi_ap(false).await,
            ControlRequest::Status => ControlReply::Status(self.status_view()),
        }
    }

    async fn send_camera_command(&self, camera: &str, command: CameraCommand) -> ControlReply {
        let tx = self.commands.read().get(camera).cloned();
        match tx {
            Some(tx) => match tx.send(command).await {
                Ok(()) => ControlReply::Ok,
                Err(_) => ControlReply::Error {
                    message: format!("camera '{camera}' command channel closed"),
                },
            },
            None => ControlReply::Error {
                message: format!("unknown camera id '{camera}'"),
            },
        }
    }

    async fn set_position(&self, camera: &str, position: String) -> ControlReply {
        {
            let mut cfg = self.config.write();
            match cfg.cameras.iter_mut().find(|c| c.id == camera) {
                Some(spec) => spec.position = position.clone(),
                None => {
                    return ControlReply::Error {
                        message: format!("unknown camera id '{camera}'"),
                    }
                }
            }
            if let Err(e) = cfg.save_to_file(&self.config_path) {
                warn!(camera, error = %e, "failed to persist updated position");
            }
        }
        self.send_camera_command(camera, CameraCommand::SetPosition(position)).await
    }

    async fn toggle_wifi_ap(&self, enable: bool) -> ControlReply {
        let result = if enable { wifi_ap::enable().await } else { wifi_ap::disable().await };
        match result {
            Ok(()) => {
                *self.wifi_ap_enabled.write() = enable;
                ControlReply::Ok
            }
            Err(e) => ControlReply::Error { message: e.to_string() },
        }
    }

    fn status_view(&self) -> AgentStatusView {
        let cfg = self.config.read();
        AgentStatusView {
            device_id: cfg.device.id.clone(),
            location: cfg.device.location.clone(),
            description: cfg.device.description.clone(),
            version: self.version.to_string(),
            wifi_ap_enabled: *self.wifi_ap_enabled.read(),
        }
    }
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).map_err(SaiCamError::Io)?;
    }
    Ok(())
}
