// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Client for the agent's read-only health socket (`crate::health::ipc`).
//! One short-lived connection per query — the agent closes it after one
//! reply, so there is nothing to keep alive here.

use std::path::Path;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::error::{Result, SaiCamError};
use crate::health::HealthSnapshot;

async fn query_raw(socket_path: &Path, request: &str) -> Result<String> {
    let stream = UnixStream::connect(socket_path).await.map_err(|e| {
        SaiCamError::Storage(format!("connecting to health socket {}: {e}", socket_path.display()))
    })?;

    let (read_half, mut write_half) = stream.into_split();
    let line = format!("\"{request}\"\n");
    write_half.write_all(line.as_bytes()).await.map_err(SaiCamError::Io)?;

    let mut reader = BufReader::new(read_half);
    let mut reply = String::new();
    reader.read_line(&mut reply).await.map_err(SaiCamError::Io)?;
    Ok(reply)
}

pub async fn query<T: DeserializeOwned>(socket_path: &Path, request: &str) -> Result<T> {
    let reply = query_raw(socket_path, request).await?;
    serde_json::from_str(reply.trim()).map_err(SaiCamError::Json)
}

pub async fn full(socket_path: &Path) -> Result<HealthSnapshot> {
    query(socket_path, "full").await
}
