//! Node configuration, loaded from a YAML file with `${NAME}` /
//! `${NAME:-default}` environment substitution.
//!
//! Only the subset named in [`Config::apply_reloadable`] may change via
//! hot reload; everything else (cameras, storage root, network, device
//! identity) requires a full restart, per the node's config contract.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SaiCamError};

/// Top-level configuration loaded from a YAML file.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub cameras: Vec<CameraSpec>,
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
    #[serde(default)]
    pub updates: UpdatesConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub wifi_ap: WifiApConfig,
    /// Advisory only; consumed by external install scripts, never read
    /// by the agent itself.
    #[serde(default)]
    pub network: serde_yaml::Value,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    Usb,
    Rtsp,
    Onvif,
}

/// Per-camera configuration. Immutable for the life of a running camera
/// worker: changing any field requires a full restart of that camera
/// (hot-reload only ever touches the sections named in
/// [`Config::apply_reloadable`]).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraSpec {
    pub id: String,
    pub kind: CameraKind,
    /// USB device path (`/dev/video0`) or index (`"0"`); RTSP URL; or
    /// ONVIF host. Interpreted according to `kind`.
    pub connection: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    pub capture_interval_seconds: u64,
    #[serde(default)]
    pub position: String,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
}

fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_fps() -> u32 {
    5
}
fn default_reconnect_attempts() -> u32 {
    3
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub base_path: PathBuf,
    #[serde(default = "default_max_size_gb")]
    pub max_size_gb: u64,
    #[serde(default = "default_cleanup_threshold_gb")]
    pub cleanup_threshold_gb: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

fn default_max_size_gb() -> u64 {
    20
}
fn default_cleanup_threshold_gb() -> u64 {
    16
}
fn default_retention_days() -> u64 {
    7
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_true")]
    pub ssl_verify: bool,
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    #[serde(default = "default_upload_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub auth_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            ssl_verify: true,
            cert_path: None,
            timeout_secs: default_upload_timeout_secs(),
            auth_token: String::new(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_server_url() -> String {
    "https://inference.example.invalid/api/v1/upload".to_string()
}
fn default_upload_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DeviceConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_cpu_warn_pct")]
    pub cpu_warn_pct: f32,
    #[serde(default = "default_mem_warn_pct")]
    pub mem_warn_pct: f32,
    #[serde(default = "default_disk_warn_pct")]
    pub disk_warn_pct: f32,
    #[serde(default = "default_temp_warn_c")]
    pub temp_warn_celsius: f32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: default_health_check_interval(),
            cpu_warn_pct: default_cpu_warn_pct(),
            mem_warn_pct: default_mem_warn_pct(),
            disk_warn_pct: default_disk_warn_pct(),
            temp_warn_celsius: default_temp_warn_c(),
        }
    }
}

fn default_health_check_interval() -> u64 {
    300
}
fn default_cpu_warn_pct() -> f32 {
    90.0
}
fn default_mem_warn_pct() -> f32 {
    90.0
}
fn default_disk_warn_pct() -> f32 {
    85.0
}
fn default_temp_warn_c() -> f32 {
    75.0
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default = "default_rotate_size_mb")]
    pub rotate_size_mb: u64,
    #[serde(default = "default_rotate_count")]
    pub rotate_count: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: default_log_dir(),
            log_file: default_log_file(),
            rotate_size_mb: default_rotate_size_mb(),
            rotate_count: default_rotate_count(),
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/sai-cam")
}
fn default_log_file() -> String {
    "agent.log".to_string()
}
fn default_rotate_size_mb() -> u64 {
    20
}
fn default_rotate_count() -> u32 {
    5
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AdvancedConfig {
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_upload_backoff_secs")]
    pub upload_backoff_secs: Vec<u64>,
    #[serde(default = "default_upload_max_attempts")]
    pub upload_max_attempts: u32,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: default_polling_interval_ms(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            upload_backoff_secs: default_upload_backoff_secs(),
            upload_max_attempts: default_upload_max_attempts(),
        }
    }
}

fn default_polling_interval_ms() -> u64 {
    100
}
fn default_reconnect_delay_secs() -> u64 {
    2
}
fn default_upload_backoff_secs() -> Vec<u64> {
    vec![1, 4, 16, 64, 256]
}
fn default_upload_max_attempts() -> u32 {
    5
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    Stable,
    Beta,
}

impl Default for ReleaseChannel {
    fn default() -> Self {
        ReleaseChannel::Stable
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpdatesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub channel: ReleaseChannel,
    #[serde(default = "default_true")]
    pub apply_immediately: bool,
    #[serde(default = "default_release_index_url")]
    pub release_index_url: String,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: ReleaseChannel::Stable,
            apply_immediately: true,
            release_index_url: default_release_index_url(),
        }
    }
}

fn default_release_index_url() -> String {
    "https://updates.example.invalid/sai-cam/releases.json".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PortalConfig {
    #[serde(default = "default_portal_bind")]
    pub bind_address: String,
    #[serde(default = "default_portal_port")]
    pub port: u16,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            bind_address: default_portal_bind(),
            port: default_portal_port(),
        }
    }
}

fn default_portal_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_portal_port() -> u16 {
    8090
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FleetConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub allowed_config_keys: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct WifiApConfig {
    #[serde(default)]
    pub ssid_template: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub country_code: String,
}

impl Config {
    /// Load, expand `${NAME}` references, parse, and validate a YAML
    /// config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SaiCamError::Config(format!("Cannot read config file: {e}")))?;
        let expanded = expand_env_vars(&raw);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| SaiCamError::Config(format!("Invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(SaiCamError::Config("No cameras defined".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for cam in &self.cameras {
            if !seen.insert(cam.id.clone()) {
                return Err(SaiCamError::Config(format!(
                    "Duplicate camera id '{}'",
                    cam.id
                )));
            }
            if cam.capture_interval_seconds == 0 {
                return Err(SaiCamError::Config(format!(
                    "Camera '{}': capture_interval_seconds must be > 0",
                    cam.id
                )));
            }
        }
        if self.storage.max_size_gb == 0 {
            return Err(SaiCamError::Config("storage.max_size_gb must be > 0".into()));
        }
        if self.storage.retention_days == 0 {
            return Err(SaiCamError::Config(
                "storage.retention_days must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Apply the narrow, documented subset of sections that may change on
    /// a hot reload: log level, monitoring thresholds, server endpoint,
    /// and advanced knobs. Everything else (cameras, storage root,
    /// network, device identity) is ignored here — those require a full
    /// restart.
    pub fn apply_reloadable(&mut self, new: &Config) {
        self.logging.level = new.logging.level.clone();
        self.monitoring = new.monitoring.clone();
        self.server = new.server.clone();
        self.advanced = new.advanced.clone();
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        let tmp = path.with_extension("yaml.tmp");
        std::fs::write(&tmp, yaml)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Expand `${NAME}` and `${NAME:-default}` references against the
/// process environment. Unmatched `${NAME}` with no default and no
/// environment value is left untouched so YAML parsing surfaces a clear
/// error rather than silently producing an empty string.
fn expand_env_vars(input: &str) -> String {
    // `$` and `{` are both single-byte ASCII, so matching delimiters on
    // bytes is safe even inside multi-byte UTF-8 text; everything between
    // matches is passed through as a whole str slice rather than
    // reconstructed byte-by-byte, so non-ASCII labels (e.g. "Córdoba")
    // survive untouched.
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    let mut plain_start = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = input[i + 2..].find('}') {
                out.push_str(&input[plain_start..i]);

                let inner = &input[i + 2..i + 2 + end];
                let (name, default) = match inner.split_once(":-") {
                    Some((n, d)) => (n, Some(d)),
                    None => (inner, None),
                };
                match std::env::var(name) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => match default {
                        Some(d) => out.push_str(d),
                        None => {
                            out.push_str("${");
                            out.push_str(inner);
                            out.push('}');
                        }
                    },
                }
                i += 2 + end + 1;
                plain_start = i;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&input[plain_start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_plain_var() {
        std::env::set_var("SAI_CAM_TEST_TOKEN", "abc123");
        let expanded = expand_env_vars("token: ${SAI_CAM_TEST_TOKEN}");
        assert_eq!(expanded, "token: abc123");
    }

    #[test]
    fn expands_with_default_when_unset() {
        std::env::remove_var("SAI_CAM_TEST_MISSING");
        let expanded = expand_env_vars("level: ${SAI_CAM_TEST_MISSING:-INFO}");
        assert_eq!(expanded, "level: INFO");
    }

    #[test]
    fn preserves_multibyte_utf8_outside_any_placeholder() {
        let expanded = expand_env_vars("position: Córdoba, río de la Plata");
        assert_eq!(expanded, "position: Córdoba, río de la Plata");
    }

    #[test]
    fn preserves_multibyte_utf8_around_a_placeholder() {
        std::env::set_var("SAI_CAM_TEST_TOKEN", "abc123");
        let expanded = expand_env_vars("position: Córdoba ${SAI_CAM_TEST_TOKEN} café");
        assert_eq!(expanded, "position: Córdoba abc123 café");
    }

    #[test]
    fn rejects_zero_capture_interval() {
        let cfg = Config {
            cameras: vec![CameraSpec {
                id: "cam1".into(),
                kind: CameraKind::Usb,
                connection: "/dev/video0".into(),
                port: None,
                username: None,
                password: None,
                width: 1920,
                height: 1080,
                fps: 5,
                capture_interval_seconds: 0,
                position: String::new(),
                reconnect_attempts: 3,
            }],
            storage: StorageConfig {
                base_path: PathBuf::from("/tmp/sai-cam"),
                max_size_gb: 10,
                cleanup_threshold_gb: 8,
                retention_days: 7,
            },
            server: ServerConfig::default(),
            device: DeviceConfig::default(),
            monitoring: MonitoringConfig::default(),
            logging: LoggingConfig::default(),
            advanced: AdvancedConfig::default(),
            updates: UpdatesConfig::default(),
            portal: PortalConfig::default(),
            fleet: FleetConfig::default(),
            wifi_ap: WifiApConfig::default(),
            network: serde_yaml::Value::Null,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_camera_ids() {
        let mut cfg_yaml = String::from(
            r#"
cameras:
  - id: cam1
    kind: usb
    connection: /dev/video0
    capture_interval_seconds: 5
  - id: cam1
    kind: usb
    connection: /dev/video1
    capture_interval_seconds: 5
storage:
  base_path: /tmp/sai-cam
"#,
        );
        cfg_yaml = expand_env_vars(&cfg_yaml);
        let cfg: Config = serde_yaml::from_str(&cfg_yaml).expect("parses");
        assert!(cfg.validate().is_err());
    }
}
