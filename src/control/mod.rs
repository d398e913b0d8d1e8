// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The write-capable counterpart to the read-only health socket: lets
//! the portal relay a small set of operator actions (force a capture,
//! restart a camera, relabel a position, toggle the access point) back
//! into the agent process without ever sharing camera state directly.

pub mod client;
pub mod ipc;
pub mod protocol;
pub mod wifi_ap;

pub use ipc::ControlServer;
pub use protocol::{AgentStatusView, ControlReply, ControlRequest};
