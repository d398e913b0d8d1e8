// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Read-only Unix domain socket IPC surface.
//!
//! Line-delimited JSON: the portal writes one request line naming
//! `{full, cameras, threads, system}`; the agent replies with one JSON
//! document and closes the connection. Every reply is served from the
//! cached [`HealthCache`] — the handler never blocks on the sampler
//! loops.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, SaiCamError};
use crate::health::monitor::HealthCache;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Request {
    Full,
    Cameras,
    Threads,
    System,
}

#[derive(Serialize)]
struct ErrorReply<'a> {
    error: &'a str,
}

pub struct IpcServer {
    socket_path: PathBuf,
    cache: Arc<HealthCache>,
}

impl IpcServer {
    pub fn new(socket_path: impl Into<PathBuf>, cache: Arc<HealthCache>) -> Self {
        Self {
            socket_path: socket_path.into(),
            cache,
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(SaiCamError::Io)?;
        }
        remove_stale_socket(&self.socket_path)?;

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            SaiCamError::Storage(format!("binding health socket {}: {e}", self.socket_path.display()))
        })?;

        // Restrict the socket to owner + group read/write so the portal
        // process (running as the same group) can connect but other
        // local users cannot.
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))
            .map_err(SaiCamError::Io)?;

        info!(path = %self.socket_path.display(), "health IPC socket listening");

        loop {
            let accept = tokio::select! {
                res = listener.accept() => res,
                _ = cancel.cancelled() => break,
            };

            let (stream, _) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "health IPC accept failed");
                    continue;
                }
            };

            let cache = self.cache.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, cache).await {
                    warn!(error = %e, "health IPC connection failed");
                }
            });
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

async fn handle_connection(stream: tokio::net::UnixStream, cache: Arc<HealthCache>) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    reader.read_line(&mut line).await.map_err(SaiCamError::Io)?;

    let request: std::result::Result<Request, _> = serde_json::from_str(line.trim());
    let snapshot = cache.read();

    let body = match request {
        Ok(Request::Full) => serde_json::to_vec(&snapshot)?,
        Ok(Request::Cameras) => serde_json::to_vec(&snapshot.cameras)?,
        Ok(Request::Threads) => serde_json::to_vec(&serde_json::json!({
            "thread_count": snapshot.thread_count,
            "stale": snapshot.stale,
        }))?,
        Ok(Request::System) => serde_json::to_vec(&snapshot.system)?,
        Err(_) => serde_json::to_vec(&ErrorReply {
            error: "unrecognized request; expected one of full, cameras, threads, system",
        })?,
    };

    write_half.write_all(&body).await.map_err(SaiCamError::Io)?;
    write_half.write_all(b"\n").await.map_err(SaiCamError::Io)?;
    write_half.shutdown().await.map_err(SaiCamError::Io)?;
    Ok(())
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).map_err(SaiCamError::Io)?;
    }
    Ok(())
}
