// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Commands a worker accepts from outside its own loop.
//!
//! Delivered over a small per-camera `mpsc` channel rather than by
//! reaching into worker state directly, keeping the coordinator's
//! message-passing discipline intact for operator-triggered actions
//! (portal requests relayed through the control socket) as well as for
//! the capture loop itself.

#[derive(Debug, Clone)]
pub enum CameraCommand {
    /// Skip the remainder of the current polling wait and capture now.
    ForceCapture,
    /// Exit the loop after this iteration; the coordinator's supervision
    /// tick observes the finished task and respawns the camera.
    Restart,
    /// Update the advisory position label used in future captures.
    SetPosition(String),
}
