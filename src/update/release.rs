// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Client for the release index the updater polls.

use semver::Version;
use serde::Deserialize;

use crate::config::ReleaseChannel;
use crate::error::{Result, SaiCamError};

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseEntry {
    pub version: String,
    #[serde(default)]
    pub prerelease: bool,
    pub artifacts_url: String,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReleaseIndex {
    releases: Vec<ReleaseEntry>,
}

pub struct ReleaseClient {
    client: reqwest::Client,
    index_url: String,
}

impl ReleaseClient {
    pub fn new(index_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("building release index client"),
            index_url: index_url.into(),
        }
    }

    async fn fetch_index(&self) -> Result<Vec<ReleaseEntry>> {
        let resp = self
            .client
            .get(&self.index_url)
            .send()
            .await
            .map_err(|e| SaiCamError::Update(format!("fetching release index: {e}")))?;
        if !resp.status().is_success() {
            return Err(SaiCamError::Update(format!(
                "release index returned HTTP {}",
                resp.status()
            )));
        }
        let index: ReleaseIndex = resp
            .json()
            .await
            .map_err(|e| SaiCamError::Update(format!("parsing release index: {e}")))?;
        Ok(index.releases)
    }

    /// Highest version greater than `current`, filtered by channel:
    /// `stable` excludes prereleases, `beta` accepts both.
    pub async fn latest_newer_than(
        &self,
        current: &Version,
        channel: ReleaseChannel,
    ) -> Result<Option<ReleaseEntry>> {
        let releases = self.fetch_index().await?;
        let mut candidates: Vec<(Version, ReleaseEntry)> = releases
            .into_iter()
            .filter(|r| channel == ReleaseChannel::Beta || !r.prerelease)
            .filter_map(|r| Version::parse(&r.version).ok().map(|v| (v, r)))
            .filter(|(v, _)| v > current)
            .collect();

        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(candidates.pop().map(|(_, entry)| entry))
    }
}
