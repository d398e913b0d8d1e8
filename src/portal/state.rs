// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;

/// Shared state passed to every portal handler. Mirrors the agent's
/// `AppState` shape closely but holds no mutable camera state of its
/// own — per the node's ownership rules the portal only ever reads the
/// health socket, the log file, and the update-state file, and relays
/// operator actions through the control socket.
pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub config_path: PathBuf,
    pub health_socket: PathBuf,
    pub control_socket: PathBuf,
    pub log_path: PathBuf,
    pub storage_root: PathBuf,
    pub update_state_path: PathBuf,
    pub version: &'static str,
}

impl AppState {
    pub fn new(config: Config, config_path: PathBuf) -> Arc<Self> {
        let health_socket = PathBuf::from("/run/sai-cam/health.sock");
        let control_socket = PathBuf::from("/run/sai-cam/control.sock");
        let log_path = config.logging.log_dir.join(&config.logging.log_file);
        let storage_root = config.storage.base_path.clone();
        let update_state_path = PathBuf::from("/var/lib/sai-cam/update_state.json");
        Arc::new(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
            health_socket,
            control_socket,
            log_path,
            storage_root,
            update_state_path,
            version: env!("CARGO_PKG_VERSION"),
        })
    }
}
