// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Health sampling and the read-only IPC surface the portal consumes.

pub mod ipc;
pub mod monitor;
pub mod registry;
pub mod snapshot;

pub use monitor::{HealthCache, HealthMonitor};
pub use registry::CameraHealthRegistry;
pub use snapshot::HealthSnapshot;
