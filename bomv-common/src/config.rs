//! Configuration loading and config file resolution
//!
//! Bootstrap configuration is a single TOML file. Every section has built-in
//! defaults, so a missing file or a partial file is valid.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BOMV_CONFIG";

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Optional pricing catalog used for local BOM previews
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_catalog: Option<PathBuf>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub detection: DetectionDefaults,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Verification gateway connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the gateway API (e.g. `http://localhost:8000/api`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Per-request timeout for everything except detection runs
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Default detection request parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionDefaults {
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f64,

    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Caller-side bound on a detection run; `None` waits indefinitely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for DetectionDefaults {
    fn default() -> Self {
        Self {
            confidence: default_confidence(),
            iou_threshold: default_iou_threshold(),
            model_id: default_model_id(),
            device: None,
            timeout_secs: None,
        }
    }
}

/// Session orchestrator behaviour switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Reload the session after a detection result is installed
    #[serde(default = "default_true")]
    pub refresh_after_detection: bool,

    /// Re-fetch the session after bulk verification instead of patching locally
    #[serde(default)]
    pub refresh_after_bulk: bool,

    /// Session event channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            refresh_after_detection: true,
            refresh_after_bulk: false,
            event_capacity: default_event_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_confidence() -> f64 {
    0.4
}

fn default_iou_threshold() -> f64 {
    0.5
}

fn default_model_id() -> String {
    "yolo_v11n".to_string()
}

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.gateway.base_url.trim().is_empty() {
            return Err(Error::Config("gateway.base_url must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence) {
            return Err(Error::Config(format!(
                "detection.confidence must be within [0, 1], got {}",
                self.detection.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.detection.iou_threshold) {
            return Err(Error::Config(format!(
                "detection.iou_threshold must be within [0, 1], got {}",
                self.detection.iou_threshold
            )));
        }
        if self.orchestrator.event_capacity == 0 {
            return Err(Error::Config(
                "orchestrator.event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config file resolution following priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `BOMV_CONFIG`
/// 3. Platform config directory (`<config_dir>/bomv/config.toml`), if it exists
///
/// Returns `None` when no file applies and built-in defaults should be used.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform default, only if present
    default_config_path().filter(|path| path.exists())
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bomv").join("config.toml"))
}

/// Load and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Resolve and load configuration, falling back to defaults when no file applies
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            let config = load_toml_config(&path)?;
            tracing::info!(path = %path.display(), "Configuration loaded");
            Ok(config)
        }
        None => {
            tracing::info!("No configuration file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Write config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
