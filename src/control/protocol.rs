// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Wire types shared by the agent's control-socket server and the
//! portal's client. Symmetric to [`crate::health::ipc`]'s read-only
//! protocol, but this one carries the handful of write actions an
//! operator can trigger from the portal: the health socket stays
//! strictly read-only so the portal process never needs write
//! permission on it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlRequest {
    Capture { camera: String },
    Restart { camera: String },
    SetPosition { camera: String, position: String },
    WifiApEnable,
    WifiApDisable,
    Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusView {
    pub device_id: String,
    pub location: String,
    pub description: String,
    pub version: String,
    pub wifi_ap_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlReply {
    Ok,
    Status(AgentStatusView),
    Error { message: String },
}
