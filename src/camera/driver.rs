// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Camera driver abstraction.
//!
//! The source implementation dispatched across camera backends via
//! runtime class reflection. Here the capability set is closed and
//! known at compile time: a tagged variant ([`crate::config::CameraKind`])
//! plus one trait, implemented by exactly three concrete drivers.

use async_trait::async_trait;

use crate::config::CameraSpec;
use crate::error::Result;

/// A captured raw frame before JPEG encoding, plus the dimensions
/// `validate_frame` needs to judge usability.
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Packed 8-bit grayscale or RGB samples, driver-dependent; only
    /// used to compute mean luminance and to hand off to the JPEG
    /// encoder.
    pub data: Vec<u8>,
    pub channels: u8,
}

/// Capability set every camera backend implements. `keep_alive` has a
/// default no-op since only the RTSP driver needs to hold a session
/// open during backoff.
#[async_trait]
pub trait CameraDriver: Send {
    /// One-time setup: open the device, establish the session, or
    /// negotiate media profiles. Called once at startup and again on
    /// every `reconnect`.
    async fn setup(&mut self, spec: &CameraSpec) -> Result<()>;

    /// Acquire exactly one frame. Must honor the per-capture timeout
    /// the caller configured on the driver at construction time.
    async fn capture_frame(&mut self) -> Result<RawFrame>;

    /// Pull (but do not decode) a frame to keep a server-side session
    /// warm during backoff. Only the RTSP driver overrides this; USB
    /// and ONVIF do nothing between scheduled attempts.
    async fn keep_alive(&mut self) -> Result<()> {
        Ok(())
    }

    /// Bounded, linear-backoff reconnection attempt. Called when the
    /// state tracker indicates the camera has gone OFFLINE.
    async fn reconnect(&mut self, spec: &CameraSpec) -> Result<()> {
        self.cleanup().await;
        self.setup(spec).await
    }

    /// Release any held resources (device handles, HTTP sessions).
    async fn cleanup(&mut self);

    /// A short human-readable description for logs (e.g. `"usb:/dev/video0"`).
    fn describe(&self) -> String;
}

/// Bytes below this mean-luminance value are logged as a (non-fatal)
/// warning: likely a near-black night frame, still useful for training.
pub const LUMINANCE_LOW: f64 = 5.0;
/// Bytes above this mean-luminance value are logged as a (non-fatal)
/// warning: likely an overexposed frame, still useful for training.
pub const LUMINANCE_HIGH: f64 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameValidation {
    pub mean_luminance: f64,
    pub out_of_range: bool,
}

/// Validate a captured frame. Identical across all three drivers: a
/// non-empty buffer, positive dimensions, and a luminance check that
/// only warns (never rejects) outside [5, 250] on the 8-bit scale.
pub fn validate_frame(frame: &RawFrame) -> Result<FrameValidation> {
    if frame.data.is_empty() {
        return Err(crate::error::SaiCamError::InvalidFrame {
            id: String::new(),
            reason: "empty frame buffer".into(),
        });
    }
    if frame.width == 0 || frame.height == 0 {
        return Err(crate::error::SaiCamError::InvalidFrame {
            id: String::new(),
            reason: format!("invalid dimensions {}x{}", frame.width, frame.height),
        });
    }

    let mean_luminance = mean_luminance(frame);
    let out_of_range = mean_luminance < LUMINANCE_LOW || mean_luminance > LUMINANCE_HIGH;

    Ok(FrameValidation {
        mean_luminance,
        out_of_range,
    })
}

fn mean_luminance(frame: &RawFrame) -> f64 {
    if frame.data.is_empty() {
        return 0.0;
    }
    let channels = frame.channels.max(1) as usize;
    let pixel_count = frame.data.len() / channels;
    if pixel_count == 0 {
        return 0.0;
    }
    let sum: u64 = frame
        .data
        .chunks(channels)
        .map(|px| {
            if px.len() >= 3 {
                // Rec. 601 luma approximation.
                (0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64) as u64
            } else {
                px[0] as u64
            }
        })
        .sum();
    sum as f64 / pixel_count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(value: u8) -> RawFrame {
        RawFrame {
            width: 4,
            height: 4,
            channels: 1,
            data: vec![value; 16],
        }
    }

    #[test]
    fn rejects_empty_buffer() {
        let frame = RawFrame {
            width: 10,
            height: 10,
            channels: 1,
            data: vec![],
        };
        assert!(validate_frame(&frame).is_err());
    }

    #[test]
    fn rejects_zero_dimensions() {
        let frame = RawFrame {
            width: 0,
            height: 10,
            channels: 1,
            data: vec![1, 2, 3],
        };
        assert!(validate_frame(&frame).is_err());
    }

    #[test]
    fn boundary_luminance_5_is_accepted_without_flag() {
        let frame = gray_frame(5);
        let v = validate_frame(&frame).unwrap();
        assert!(!v.out_of_range, "exactly 5 is the inclusive boundary");
    }

    #[test]
    fn boundary_luminance_250_is_accepted_without_flag() {
        let frame = gray_frame(250);
        let v = validate_frame(&frame).unwrap();
        assert!(!v.out_of_range, "exactly 250 is the inclusive boundary");
    }

    #[test]
    fn below_5_is_flagged_but_still_ok() {
        let frame = gray_frame(4);
        let v = validate_frame(&frame).unwrap();
        assert!(v.out_of_range);
    }

    #[test]
    fn above_250_is_flagged_but_still_ok() {
        let frame = gray_frame(251);
        let v = validate_frame(&frame).unwrap();
        assert!(v.out_of_range);
    }
}
