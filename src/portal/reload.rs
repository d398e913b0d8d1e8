// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Tells the agent process to reload its config after the portal has
//! written a change to the shared config file. The agent and portal are
//! separate processes with no shared memory, so this goes through the
//! simplest thing that works: the agent writes its PID on startup, the
//! portal sends it `SIGHUP`.

use std::path::PathBuf;

use tracing::warn;

const PID_FILE: &str = "/run/sai-cam/agent.pid";

pub fn signal_agent_reload() {
    let pid_path = PathBuf::from(PID_FILE);
    let pid = match std::fs::read_to_string(&pid_path) {
        Ok(s) => s.trim().to_string(),
        Err(e) => {
            warn!(error = %e, "could not read agent pid file, reload signal not sent");
            return;
        }
    };

    match std::process::Command::new("kill").arg("-HUP").arg(&pid).status() {
        Ok(status) if status.success() => {}
        Ok(status) => warn!(%status, "kill -HUP to agent failed"),
        Err(e) => warn!(error = %e, "could not invoke kill to signal agent reload"),
    }
}

pub fn write_pid_file() -> std::io::Result<()> {
    let pid_path = PathBuf::from(PID_FILE);
    if let Some(parent) = pid_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&pid_path, std::process::id().to_string())
}
