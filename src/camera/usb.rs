// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! USB camera driver (Video4Linux2).
//!
//! Opens a local video device by path or index, applies resolution/FPS
//! hints on a best-effort basis, and discards a handful of warm-up
//! frames so the first stored capture isn't an auto-exposure transient.

use async_trait::async_trait;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use crate::camera::driver::{CameraDriver, RawFrame};
use crate::config::CameraSpec;
use crate::error::{Result, SaiCamError};

const WARMUP_FRAMES: usize = 3;

pub struct UsbDriver {
    device_path: String,
    // Declared before `device` so a replaced/dropped stream always lets
    // go of its borrow before the `Device` it points into is freed.
    stream: Option<MmapStream<'static>>,
    // The stream borrows from this `Device` for as long as it's open;
    // boxing gives it a stable heap address so the borrow stays valid
    // across moves of `UsbDriver` itself. See `setup` for how the
    // borrow is constructed.
    device: Option<Box<Device>>,
}

impl UsbDriver {
    pub fn new() -> Self {
        Self {
            device_path: String::new(),
            stream: None,
            device: None,
        }
    }

    fn resolve_path(spec: &CameraSpec) -> String {
        if spec.connection.starts_with('/') {
            spec.connection.clone()
        } else {
            format!("/dev/video{}", spec.connection)
        }
    }
}

impl Default for UsbDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDriver for UsbDriver {
    async fn setup(&mut self, spec: &CameraSpec) -> Result<()> {
        self.device_path = Self::resolve_path(spec);
        let id = spec.id.clone();
        let path = self.device_path.clone();
        let (width, height) = (spec.width, spec.height);

        let (device, stream) = tokio::task::spawn_blocking(
            move || -> Result<(Box<Device>, MmapStream<'static>)> {
                if !std::path::Path::new(&path).exists() {
                    return Err(SaiCamError::DeviceNotFound { id: id.clone() });
                }

                let dev = Device::with_path(&path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied
                        || e.raw_os_error() == Some(libc_ebusy())
                    {
                        SaiCamError::DeviceBusy { id: id.clone() }
                    } else {
                        SaiCamError::Unreachable {
                            id: id.clone(),
                            reason: e.to_string(),
                        }
                    }
                })?;
                let dev = Box::new(dev);

                let mut fmt = dev.format().map_err(SaiCamError::Io)?;
                fmt.width = width;
                fmt.height = height;
                fmt.fourcc = FourCC::new(b"MJPG");
                let _ = dev.set_format(&fmt);

                // SAFETY: `dev` is heap-allocated and moves with the `Box`,
                // never by value, so this reference stays valid for as long
                // as the `Box<Device>` returned alongside the stream is
                // kept alive. `cleanup` drops the stream before the device.
                let dev_ref: &'static Device = unsafe { &*(dev.as_ref() as *const Device) };
                let stream = MmapStream::with_buffers(dev_ref, Type::VideoCapture, 4)
                    .map_err(SaiCamError::Io)?;
                Ok((dev, stream))
            },
        )
        .await
        .map_err(|e| SaiCamError::Unreachable {
            id: spec.id.clone(),
            reason: format!("setup task panicked: {e}"),
        })??;

        self.stream = Some(stream);
        self.device = Some(device);

        // Discard warm-up frames so the first stored capture isn't an
        // auto-exposure transient.
        if let Some(stream) = self.stream.as_mut() {
            for _ in 0..WARMUP_FRAMES {
                let _ = stream.next();
            }
        }

        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<RawFrame> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SaiCamError::Unreachable {
                id: String::new(),
                reason: "device not set up".into(),
            })?;

        let (buf, _meta) = stream.next().map_err(SaiCamError::Io)?;
        let decoded = image::load_from_memory(buf)
            .map_err(|e| SaiCamError::InvalidFrame {
                id: String::new(),
                reason: format!("MJPG decode failed: {e}"),
            })?
            .to_rgb8();

        Ok(RawFrame {
            width: decoded.width(),
            height: decoded.height(),
            channels: 3,
            data: decoded.into_raw(),
        })
    }

    async fn cleanup(&mut self) {
        // Drop the stream first: it holds a reference into `device`.
        self.stream = None;
        self.device = None;
    }

    fn describe(&self) -> String {
        format!("usb:{}", self.device_path)
    }
}

fn libc_ebusy() -> i32 {
    16 // EBUSY on Linux; avoids a libc dependency for one constant.
}
