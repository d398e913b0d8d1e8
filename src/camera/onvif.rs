// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! ONVIF camera driver.
//!
//! The source implementation walked a WSDL-derived client through
//! dynamic reflection. Here only the three operations a snapshot-based
//! capture loop actually needs are hand-written as SOAP request
//! templates: `GetDeviceInformation` (reachability probe),
//! `GetProfiles` (pick a media profile), `GetSnapshotUri` (resolve the
//! JPEG endpoint once per setup). The snapshot itself is a plain
//! digest-authenticated `GET`.

use std::time::Duration;

use reqwest::Client;

use crate::camera::driver::{CameraDriver, RawFrame};
use crate::config::CameraSpec;
use crate::error::{Result, SaiCamError};

const SOAP_ENVELOPE_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"
               xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
               xmlns:trt="http://www.onvif.org/ver10/media/wsdl">
  <soap:Body>"#;
const SOAP_ENVELOPE_CLOSE: &str = "  </soap:Body>\n</soap:Envelope>";

pub struct OnvifDriver {
    client: Client,
    device_service_url: String,
    media_service_url: String,
    snapshot_uri: Option<String>,
    username: Option<String>,
    password: Option<String>,
    capture_timeout: Duration,
}

impl OnvifDriver {
    pub fn new(capture_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(capture_timeout)
            .build()
            .map_err(|e| SaiCamError::Unreachable {
                id: String::new(),
                reason: format!("building HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            device_service_url: String::new(),
            media_service_url: String::new(),
            snapshot_uri: None,
            username: None,
            password: None,
            capture_timeout,
        })
    }

    fn base_url(spec: &CameraSpec) -> String {
        let port = spec.port.unwrap_or(80);
        format!("http://{}:{}", spec.connection, port)
    }

    async fn soap_request(&self, url: &str, id: &str, body: &str) -> Result<String> {
        let envelope = format!("{SOAP_ENVELOPE_OPEN}{body}\n{SOAP_ENVELOPE_CLOSE}");

        let mut req = self
            .client
            .post(url)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(envelope.clone());

        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            req = req.basic_auth(user, Some(pass));
        }

        let resp = req.send().await.map_err(|e| SaiCamError::Unreachable {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Retry once with digest auth derived from the WWW-Authenticate
            // challenge; most ONVIF devices reject plain basic auth.
            if let Some(www_auth) = resp
                .headers()
                .get(reqwest::header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
            {
                return self
                    .soap_request_digest(url, id, &envelope, &www_auth)
                    .await;
            }
            return Err(SaiCamError::CameraAuth {
                id: id.to_string(),
                reason: "401 with no WWW-Authenticate challenge".into(),
            });
        }

        if !status.is_success() {
            return Err(SaiCamError::HttpError {
                id: id.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| SaiCamError::Unreachable {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn soap_request_digest(
        &self,
        url: &str,
        id: &str,
        envelope: &str,
        www_auth: &str,
    ) -> Result<String> {
        let (user, pass) = match (&self.username, &self.password) {
            (Some(u), Some(p)) => (u.as_str(), p.as_str()),
            _ => {
                return Err(SaiCamError::CameraAuth {
                    id: id.to_string(),
                    reason: "device requires auth but no credentials configured".into(),
                })
            }
        };

        let mut ctx = digest_auth::AuthContext::new(user, pass, url);
        let mut prompt = digest_auth::parse(www_auth).map_err(|e| SaiCamError::CameraAuth {
            id: id.to_string(),
            reason: format!("unparseable digest challenge: {e}"),
        })?;
        ctx.method = digest_auth::HttpMethod::POST;
        let answer = prompt
            .respond(&ctx)
            .map_err(|e| SaiCamError::CameraAuth {
                id: id.to_string(),
                reason: format!("digest response failed: {e}"),
            })?
            .to_header_string();

        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .header(reqwest::header::AUTHORIZATION, answer)
            .body(envelope.to_string())
            .send()
            .await
            .map_err(|e| SaiCamError::Unreachable {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SaiCamError::CameraAuth {
                id: id.to_string(),
                reason: "digest auth rejected".into(),
            });
        }
        if !status.is_success() {
            return Err(SaiCamError::HttpError {
                id: id.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| SaiCamError::Unreachable {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_snapshot_uri(&self, id: &str) -> Result<String> {
        let get_profiles = "<trt:GetProfiles/>";
        let profiles_xml = self
            .soap_request(&self.media_service_url, id, get_profiles)
            .await?;

        let token = extract_first_tag_attr(&profiles_xml, "Profiles", "token").ok_or_else(|| {
            SaiCamError::NoProfile {
                id: id.to_string(),
            }
        })?;

        let get_snapshot_uri = format!(
            "<trt:GetSnapshotUri><trt:ProfileToken>{token}</trt:ProfileToken></trt:GetSnapshotUri>"
        );
        let resp_xml = self
            .soap_request(&self.media_service_url, id, &get_snapshot_uri)
            .await?;

        extract_tag_text(&resp_xml, "Uri").ok_or_else(|| SaiCamError::NoProfile {
            id: id.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl CameraDriver for OnvifDriver {
    async fn setup(&mut self, spec: &CameraSpec) -> Result<()> {
        let base = Self::base_url(spec);
        self.device_service_url = format!("{base}/onvif/device_service");
        self.media_service_url = format!("{base}/onvif/media_service");
        self.username = spec.username.clone();
        self.password = spec.password.clone();

        // Reachability + capability probe.
        self.soap_request(
            &self.device_service_url,
            &spec.id,
            "<tds:GetDeviceInformation/>",
        )
        .await?;

        let uri = self.fetch_snapshot_uri(&spec.id).await?;
        self.snapshot_uri = Some(uri);
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<RawFrame> {
        let uri = self
            .snapshot_uri
            .clone()
            .ok_or_else(|| SaiCamError::NoProfile {
                id: String::new(),
            })?;

        let mut req = self.client.get(&uri);
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            req = req.basic_auth(user, Some(pass));
        }

        let resp = tokio::time::timeout(self.capture_timeout, req.send())
            .await
            .map_err(|_| SaiCamError::CaptureTimeout { id: String::new() })?
            .map_err(|e| SaiCamError::Unreachable {
                id: String::new(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SaiCamError::CameraAuth {
                id: String::new(),
                reason: "snapshot request rejected".into(),
            });
        }
        if !status.is_success() {
            return Err(SaiCamError::HttpError {
                id: String::new(),
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| SaiCamError::Unreachable {
            id: String::new(),
            reason: e.to_string(),
        })?;

        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| SaiCamError::InvalidFrame {
                id: String::new(),
                reason: format!("snapshot JPEG decode failed: {e}"),
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
        self.snapshot_uri = None;
    }

    fn describe(&self) -> String {
        format!("onvif:{}", self.device_service_url)
    }
}

/// Extract the `attr` value from the first element named `tag` in a
/// SOAP response, without pulling in a full XML parser for three fields.
fn extract_first_tag_attr(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let tag_start = xml.find(&format!("{tag}"))?;
    let slice = &xml[tag_start..];
    let attr_marker = format!("{attr}=\"");
    let attr_start = slice.find(&attr_marker)? + attr_marker.len();
    let attr_end = slice[attr_start..].find('"')? + attr_start;
    Some(slice[attr_start..attr_end].to_string())
}

fn extract_tag_text(xml: &str, tag: &str) -> Option<String> {
    let open_pos = xml.find(&format!("{tag}>"))?;
    let after_open = xml[open_pos..].find('>')? + open_pos + 1;
    let close_rel = xml[after_open..].find("</")?;
    Some(xml[after_open..after_open + close_rel].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tag_text() {
        let xml = "<a:Uri xmlns:a=\"x\">http://cam/snap.jpg</a:Uri>";
        assert_eq!(
            extract_tag_text(xml, "Uri").as_deref(),
            Some("http://cam/snap.jpg")
        );
    }

    #[test]
    fn extracts_profile_token_attribute() {
        let xml = r#"<trt:Profiles token="Profile_1" fixed="true"><Name>main</Name></trt:Profiles>"#;
        assert_eq!(
            extract_first_tag_attr(xml, "Profiles", "token").as_deref(),
            Some("Profile_1")
        );
    }
}
