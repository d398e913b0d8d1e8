// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Camera backends and the per-camera health state machine.

pub mod driver;
pub mod onvif;
pub mod rtsp;
pub mod tracker;
pub mod usb;

use std::time::Duration;

use crate::config::{CameraKind, CameraSpec};
use crate::error::Result;
use driver::CameraDriver;

/// Construct the concrete driver named by `spec.kind`. The returned
/// trait object is not yet set up; the caller drives `setup`/`capture_frame`
/// per the scheduling loop in [`crate::capture::worker`].
pub fn build_driver(spec: &CameraSpec, capture_timeout: Duration) -> Result<Box<dyn CameraDriver>> {
    match spec.kind {
        CameraKind::Usb => Ok(Box::new(usb::UsbDriver::new())),
        CameraKind::Rtsp => Ok(Box::new(rtsp::RtspDriver::new(capture_timeout))),
        CameraKind::Onvif => Ok(Box::new(onvif::OnvifDriver::new(capture_timeout)?)),
    }
}
