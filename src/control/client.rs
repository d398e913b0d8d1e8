// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The portal's client for the agent's control socket: one request,
//! one reply, connection closed by the server.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::control::protocol::{ControlReply, ControlRequest};
use crate::error::{Result, SaiCamError};

pub async fn send(socket_path: &Path, request: ControlRequest) -> Result<ControlReply> {
    let stream = UnixStream::connect(socket_path).await.map_err(|e| {
        SaiCamError::Storage(format!("connecting to control socket {}: {e}", socket_path.display()))
    })?;

    let (read_half, mut write_half) = stream.into_split();
    let mut line = serde_json::to_string(&request)?;
    line.push('\n');
    write_half.write_all(line.as_bytes()).await.map_err(SaiCamError::Io)?;

    let mut reader = BufReader::new(read_half);
    let mut reply_line = String::new();
    reader.read_line(&mut reply_line).await.map_err(SaiCamError::Io)?;

    serde_json::from_str(reply_line.trim()).map_err(SaiCamError::Json)
}
