// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Toggling the field-site access point.
//!
//! The agent does not configure hostapd/dnsmasq itself — `network` and
//! `wifi_ap` are advisory sections consumed by the external install
//! scripts per the node's config contract. All the agent does here is
//! start or stop the unit those scripts already installed.

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{Result, SaiCamError};

const AP_UNIT: &str = "sai-cam-wifi-ap.service";

pub async fn enable() -> Result<()> {
    run_systemctl("start").await
}

pub async fn disable() -> Result<()> {
    run_systemctl("stop").await
}

async fn run_systemctl(verb: &str) -> Result<()> {
    let output = Command::new("systemctl")
        .arg(verb)
        .arg(AP_UNIT)
        .output()
        .await
        .map_err(SaiCamError::Io)?;

    if output.status.success() {
        info!(verb, unit = AP_UNIT, "wifi access point toggled");
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        warn!(verb, unit = AP_UNIT, stderr, "systemctl call failed");
        Err(SaiCamError::Storage(format!(
            "systemctl {verb} {AP_UNIT} failed: {stderr}"
        )))
    }
}
