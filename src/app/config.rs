use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::AppError;
use crate::app::models::ForwardSpec;

pub const CONFIG_PATH_ENV: &str = "ACCESSIBILITY_INSPECTOR_CONFIG_PATH";
const CONFIG_FILE_NAME: &str = ".accessibility_inspector_config.json";

const MAX_SETTLE_DELAY_MS: u64 = 10_000;
const MIN_QUERY_TIMEOUT_MS: u64 = 100;
const MAX_ERROR_BACKOFF_MS: u64 = 5_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdbSettings {
    pub command_path: String,
    pub base_dir: String,
    pub command_timeout_secs: u64,
    pub screenshot_timeout_secs: u64,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            base_dir: String::new(),
            command_timeout_secs: 10,
            screenshot_timeout_secs: 20,
        }
    }
}

impl AdbSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn screenshot_timeout(&self) -> Duration {
        Duration::from_secs(self.screenshot_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompanionSettings {
    pub package: String,
    pub accessibility_service: String,
    pub foreground_service: String,
}

impl Default for CompanionSettings {
    fn default() -> Self {
        Self {
            package: "com.jwlilly.accessibilityinspector".to_string(),
            accessibility_service:
                "com.jwlilly.accessibilityinspector/com.jwlilly.accessibilityinspector.AccessibilityInspector"
                    .to_string(),
            foreground_service: "com.jwlilly.accessibilityinspector/.SocketService".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForwardSettings {
    pub local: String,
    pub remote: String,
    pub settle_delay_ms: u64,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            local: "tcp:38301".to_string(),
            remote: "tcp:38301".to_string(),
            settle_delay_ms: 1_000,
        }
    }
}

impl ForwardSettings {
    pub fn spec(&self) -> ForwardSpec {
        ForwardSpec::new(&self.local, &self.remote)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoverySettings {
    pub service_type: String,
    pub query_timeout_ms: u64,
    pub error_backoff_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            service_type: "_adb-tls-pairing._tcp.local.".to_string(),
            query_timeout_ms: 3_000,
            error_backoff_ms: 200,
        }
    }
}

impl DiscoverySettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub companion: CompanionSettings,
    #[serde(default)]
    pub forward: ForwardSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = AppConfig::default();
    if config.adb.command_timeout_secs == 0 {
        config.adb.command_timeout_secs = defaults.adb.command_timeout_secs;
    }
    if config.adb.screenshot_timeout_secs == 0 {
        config.adb.screenshot_timeout_secs = defaults.adb.screenshot_timeout_secs;
    }
    if config.companion.package.trim().is_empty() {
        config.companion.package = defaults.companion.package;
    }
    if config.companion.accessibility_service.trim().is_empty() {
        config.companion.accessibility_service = defaults.companion.accessibility_service;
    }
    if config.companion.foreground_service.trim().is_empty() {
        config.companion.foreground_service = defaults.companion.foreground_service;
    }
    if config.forward.local.trim().is_empty() || config.forward.remote.trim().is_empty() {
        config.forward.local = defaults.forward.local;
        config.forward.remote = defaults.forward.remote;
    }
    if config.forward.settle_delay_ms > MAX_SETTLE_DELAY_MS {
        config.forward.settle_delay_ms = defaults.forward.settle_delay_ms;
    }
    if config.discovery.service_type.trim().is_empty() {
        config.discovery.service_type = defaults.discovery.service_type;
    }
    if config.discovery.query_timeout_ms < MIN_QUERY_TIMEOUT_MS {
        config.discovery.query_timeout_ms = defaults.discovery.query_timeout_ms;
    }
    if config.discovery.error_backoff_ms == 0 || config.discovery.error_backoff_ms > MAX_ERROR_BACKOFF_MS {
        config.discovery.error_backoff_ms = defaults.discovery.error_backoff_ms;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = defaults.logging.log_level;
    }
    config
}
