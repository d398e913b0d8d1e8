// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! RTSP camera driver, built on a GStreamer appsink pipeline:
//!
//!   rtspsrc (tcp, low latency) → decodebin → videoconvert → appsink (RGB)
//!
//! The decoder element is left to `decodebin`'s auto-plugging, which
//! prefers a hardware-accelerated decoder when the platform exposes
//! one. `keep_alive` pulls and discards a sample to keep the RTSP
//! session from timing out while the camera is in backoff.

use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tokio::sync::mpsc;

use crate::camera::driver::{CameraDriver, RawFrame};
use crate::config::CameraSpec;
use crate::error::{Result, SaiCamError};

const SAMPLE_CHANNEL_DEPTH: usize = 4;

pub struct RtspDriver {
    pipeline: Option<gst::Pipeline>,
    rx: Option<mpsc::Receiver<RawFrame>>,
    url: String,
    capture_timeout: Duration,
}

impl RtspDriver {
    pub fn new(capture_timeout: Duration) -> Self {
        Self {
            pipeline: None,
            rx: None,
            url: String::new(),
            capture_timeout,
        }
    }

    fn build_url(spec: &CameraSpec) -> String {
        if spec.connection.contains("://") {
            return spec.connection.clone();
        }
        match (&spec.username, &spec.password) {
            (Some(u), Some(p)) => format!("rtsp://{u}:{p}@{}", spec.connection),
            _ => format!("rtsp://{}", spec.connection),
        }
    }
}

#[async_trait::async_trait]
impl CameraDriver for RtspDriver {
    async fn setup(&mut self, spec: &CameraSpec) -> Result<()> {
        gst::init().map_err(|e| SaiCamError::Unreachable {
            id: spec.id.clone(),
            reason: format!("gst::init: {e}"),
        })?;

        self.url = Self::build_url(spec);

        let pipeline_str = format!(
            "rtspsrc location={url} latency=200 protocols=tcp ! \
             decodebin ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=sink emit-signals=true max-buffers=2 drop=true sync=false",
            url = self.url
        );

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| classify_launch_error(&spec.id, &e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| SaiCamError::Unreachable {
                id: spec.id.clone(),
                reason: "parsed element graph is not a Pipeline".into(),
            })?;

        let appsink: gst_app::AppSink = pipeline
            .by_name("sink")
            .ok_or_else(|| SaiCamError::Unreachable {
                id: spec.id.clone(),
                reason: "appsink element not found".into(),
            })?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| SaiCamError::Unreachable {
                id: spec.id.clone(),
                reason: "cast to AppSink failed".into(),
            })?;

        let (tx, rx) = mpsc::channel::<RawFrame>(SAMPLE_CHANNEL_DEPTH);
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Error)?;
                    let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                    let s = caps.structure(0).ok_or(gst::FlowError::Error)?;
                    let width: i32 = s.get("width").unwrap_or(0);
                    let height: i32 = s.get("height").unwrap_or(0);
                    let buf = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buf.map_readable().map_err(|_| gst::FlowError::Error)?;
                    let frame = RawFrame {
                        width: width.max(0) as u32,
                        height: height.max(0) as u32,
                        channels: 3,
                        data: map.as_slice().to_vec(),
                    };
                    let _ = tx.try_send(frame);
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| SaiCamError::Unreachable {
                id: spec.id.clone(),
                reason: format!("set_state Playing: {e}"),
            })?;

        self.pipeline = Some(pipeline);
        self.rx = Some(rx);
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<RawFrame> {
        let rx = self.rx.as_mut().ok_or_else(|| SaiCamError::Unreachable {
            id: String::new(),
            reason: "pipeline not set up".into(),
        })?;

        tokio::time::timeout(self.capture_timeout, rx.recv())
            .await
            .map_err(|_| SaiCamError::CaptureTimeout { id: String::new() })?
            .ok_or_else(|| SaiCamError::Unreachable {
                id: String::new(),
                reason: "appsink channel closed".into(),
            })
    }

    async fn keep_alive(&mut self) -> Result<()> {
        if let Some(rx) = self.rx.as_mut() {
            let _ = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        }
        Ok(())
    }

    async fn cleanup(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gst::State::Null);
        }
        self.rx = None;
    }

    fn describe(&self) -> String {
        format!("rtsp:{}", redact_credentials(&self.url))
    }
}

fn classify_launch_error(id: &str, msg: &str) -> SaiCamError {
    let lower = msg.to_lowercase();
    if lower.contains("unauthorized") || lower.contains("401") {
        SaiCamError::CameraAuth {
            id: id.to_string(),
            reason: msg.to_string(),
        }
    } else if lower.contains("no decoder") || lower.contains("codec") {
        SaiCamError::Codec {
            id: id.to_string(),
            reason: msg.to_string(),
        }
    } else {
        SaiCamError::Unreachable {
            id: id.to_string(),
            reason: msg.to_string(),
        }
    }
}

fn redact_credentials(url: &str) -> String {
    if let Some(at) = url.find('@') {
        if let Some(scheme_end) = url.find("://") {
            return format!("{}://***@{}", &url[..scheme_end], &url[at + 1..]);
        }
    }
    url.to_string()
}
