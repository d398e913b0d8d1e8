// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The update controller: a one-shot run invoked periodically by a host
//! timer. Acquires an exclusive on-disk lock (grounded in the same
//! `fs2::try_lock_exclusive` + PID-file pattern used by the daemon
//! lifecycle code in the reference pack), checks the release index,
//! fetches and pre-flights a newer release, applies it, health-verifies,
//! and rolls back on failure. Every transition is persisted via
//! `UpdateState::save` before the next step runs, so a crash mid-update
//! leaves a state file describing exactly where it stopped.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use semver::Version;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::{Config, ReleaseChannel};
use crate::error::{Result, SaiCamError};
use crate::update::preflight;
use crate::update::release::ReleaseClient;
use crate::update::state::{UpdateState, UpdateStatus};

pub struct UpdateController {
    lock_path: PathBuf,
    state_path: PathBuf,
    working_dir: PathBuf,
    installer_path: PathBuf,
    current_version: Version,
    config: Config,
}

pub struct RunOptions {
    pub force: bool,
    pub check_only: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { force: false, check_only: false }
    }
}

impl UpdateController {
    pub fn new(
        lock_path: PathBuf,
        state_path: PathBuf,
        working_dir: PathBuf,
        installer_path: PathBuf,
        current_version: Version,
        config: Config,
    ) -> Self {
        Self {
            lock_path,
            state_path,
            working_dir,
            installer_path,
            current_version,
            config,
        }
    }

    /// Returns `Ok(true)` if an update cycle ran to completion (whatever
    /// the outcome), `Ok(false)` if it exited silently because another
    /// instance holds the lock.
    pub async fn run(&self, opts: RunOptions) -> Result<bool> {
        let Some(_lock) = self.acquire_lock()? else {
            info!("update controller: lock held by another instance, exiting silently");
            return Ok(false);
        };

        let mut state = UpdateState::load_or_init(
            &self.state_path,
            &self.current_version.to_string(),
            self.config.updates.channel,
        )?;

        if !self.config.updates.enabled && !opts.force {
            info!("updates disabled in config, skipping");
            return Ok(true);
        }
        if state.consecutive_failures >= 3 && !opts.force {
            warn!(
                failures = state.consecutive_failures,
                "three-strike guard tripped, refusing to run without --force"
            );
            return Ok(true);
        }

        let client = ReleaseClient::new(&self.config.updates.release_index_url);
        state.last_check = Some(chrono::Utc::now());

        let newer = match client
            .latest_newer_than(&self.current_version, self.config.updates.channel)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "release index check failed");
                state.status = UpdateStatus::CheckFailed;
                state.save(&self.state_path)?;
                return Ok(true);
            }
        };

        let Some(release) = newer else {
            state.status = UpdateStatus::UpToDate;
            state.save(&self.state_path)?;
            info!("up to date");
            return Ok(true);
        };

        if opts.check_only {
            state.latest_available = Some(release.version.clone());
            state.save(&self.state_path)?;
            info!(version = release.version, "newer release available (check-only)");
            return Ok(true);
        }

        info!(version = release.version, "newer release found, fetching");
        state.latest_available = Some(release.version.clone());

        let fetch_dir = self.working_dir.join(&release.version);
        if let Err(e) = self.fetch_release(&release.artifacts_url, &fetch_dir).await {
            warn!(error = %e, "fetch failed");
            state.status = UpdateStatus::FetchFailed;
            state.save(&self.state_path)?;
            return Ok(true);
        }

        let declared_version = match preflight::read_declared_version(&fetch_dir) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "pre-flight failed: could not read fetched manifest.json");
                state.status = UpdateStatus::PreflightFailed;
                state.consecutive_failures += 1;
                state.save(&self.state_path)?;
                return Ok(true);
            }
        };

        if let Err(e) = preflight::check(&fetch_dir, &declared_version, &release.version) {
            warn!(error = %e, "pre-flight failed");
            state.status = UpdateStatus::PreflightFailed;
            state.consecutive_failures += 1;
            state.save(&self.state_path)?;
            return Ok(true);
        }

        state.previous_version = Some(self.current_version.to_string());
        state.status = UpdateStatus::Updating;
        state.save(&self.state_path)?;

        if !self.config.updates.apply_immediately {
            state.status = UpdateStatus::Updated;
            state.staged_only = true;
            state.save(&self.state_path)?;
            info!(version = release.version, "staged release, deferred to next apply");
            return Ok(true);
        }

        self.run_installer(&fetch_dir, "apply").await?;

        if self.health_verify(&release.version).await {
            state.status = UpdateStatus::Updated;
            state.current_version = release.version.clone();
            state.consecutive_failures = 0;
            state.last_update = Some(chrono::Utc::now());
            state.staged_only = false;
            state.save(&self.state_path)?;
            info!(version = release.version, "update applied and verified");
            return Ok(true);
        }

        warn!("health verification failed, rolling back");
        state.status = UpdateStatus::RollingBack;
        state.save(&self.state_path)?;

        let previous_dir = self.working_dir.join(&self.current_version.to_string());
        let rollback_ok = self.run_installer(&previous_dir, "apply").await.is_ok()
            && self.health_verify(&self.current_version.to_string()).await;

        state.consecutive_failures += 1;
        state.status = if rollback_ok {
            UpdateStatus::RollbackCompleted
        } else {
            UpdateStatus::RollbackFailed
        };
        state.save(&self.state_path)?;
        Ok(true)
    }

    /// Apply a previously staged release (`sai-cam-updater --apply-staged`).
    pub async fn apply_staged(&self) -> Result<()> {
        let mut state = UpdateState::load_or_init(
            &self.state_path,
            &self.current_version.to_string(),
            self.config.updates.channel,
        )?;
        if !state.staged_only {
            return Err(SaiCamError::Update("no staged release to apply".into()));
        }
        let version = state
            .latest_available
            .clone()
            .ok_or_else(|| SaiCamError::Update("staged state missing latest_available version".into()))?;
        let staged_dir = self.working_dir.join(&version);

        self.run_installer(&staged_dir, "apply").await?;
        if self.health_verify(&version).await {
            state.status = UpdateStatus::Updated;
            state.current_version = version;
            state.staged_only = false;
            state.consecutive_failures = 0;
            state.last_update = Some(chrono::Utc::now());
        } else {
            state.status = UpdateStatus::RollbackFailed;
            state.consecutive_failures += 1;
        }
        state.save(&self.state_path)
    }

    fn acquire_lock(&self) -> Result<Option<std::fs::File>> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(SaiCamError::Io)?;
        }
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(SaiCamError::Io)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                let mut f = &file;
                let _ = f.set_len(0);
                let _ = writeln!(f, "{}", std::process::id());
                Ok(Some(file))
            }
            Err(_) => Ok(None),
        }
    }

    async fn fetch_release(&self, artifacts_url: &str, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest).map_err(SaiCamError::Io)?;
        let client = reqwest::Client::new();
        let resp = client
            .get(artifacts_url)
            .send()
            .await
            .map_err(|e| SaiCamError::Update(format!("downloading release artifacts: {e}")))?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SaiCamError::Update(format!("reading release artifacts: {e}")))?;
        let archive_path = dest.join("release.tar.gz");
        std::fs::write(&archive_path, &bytes).map_err(SaiCamError::Io)?;

        let status = Command::new("tar")
            .arg("xzf")
            .arg(&archive_path)
            .arg("-C")
            .arg(dest)
            .status()
            .await
            .map_err(SaiCamError::Io)?;
        if !status.success() {
            return Err(SaiCamError::Update("extracting release archive failed".into()));
        }
        Ok(())
    }

    async fn run_installer(&self, release_dir: &Path, verb: &str) -> Result<()> {
        let status = Command::new(&self.installer_path)
            .arg(verb)
            .arg("--preserve-config")
            .arg(release_dir)
            .status()
            .await
            .map_err(SaiCamError::Io)?;
        if !status.success() {
            return Err(SaiCamError::Update(format!("installer {verb} exited with {status}")));
        }
        Ok(())
    }

    /// Poll for up to 120s (every 10s) for the agent and portal to both
    /// be reachable and reporting the expected version.
    async fn health_verify(&self, expected_version: &str) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(120);
        loop {
            if self.agent_and_portal_report(expected_version).await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }

    async fn agent_and_portal_report(&self, expected_version: &str) -> bool {
        let health_socket = PathBuf::from("/run/sai-cam/health.sock");
        let agent_ok = crate::portal::health_client::full(&health_socket).await.is_ok();

        let portal_url = format!(
            "http://127.0.0.1:{}/api/status",
            self.config.portal.port
        );
        let portal_ok = reqwest::get(&portal_url)
            .await
            .ok()
            .and_then(|resp| resp.error_for_status().ok())
            .map(|resp| resp.json::<serde_json::Value>());
        let portal_ok = match portal_ok {
            Some(fut) => fut
                .await
                .ok()
                .and_then(|v| v.get("node").and_then(|n| n.get("version")).and_then(|v| v.as_str()).map(str::to_string))
                .map(|v| v == expected_version)
                .unwrap_or(false),
            None => false,
        };

        agent_ok && portal_ok
    }
}
