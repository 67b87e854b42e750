//! TOML-based configuration persistence for the Keyhook service.
//!
//! Reads and writes [`AppConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Keyhook\config.toml`
//! - Linux:    `~/.config/keyhook/config.toml`
//! - macOS:    `~/Library/Application Support/Keyhook/config.toml`
//!
//! An explicit path (from `--config` or `KEYHOOK_CONFIG`) overrides the
//! platform location.
//!
//! ```toml
//! [settings]
//! log_level = "info"
//! wait_timeout_ms = 100
//!
//! [[devices]]
//! hardware_id = "HID\\VID_1532&PID_0226"
//! friendly_name = "Macro pad"
//! intercepted = true
//!
//! [[bindings]]
//! device_hardware_id = "HID\\VID_1532&PID_0226"
//! scan_code = 59
//! key_name = "F1"
//!
//! [bindings.action]
//! type_id = "send_keys"
//! parameters = { key_sequence = "Ctrl+Shift+F1" }
//! ```
//!
//! Fields annotated with `#[serde(default = "some_fn")]` fall back to
//! `some_fn()` when absent, so a first run with no file and an older file
//! missing newer fields both load.

use std::path::{Path, PathBuf};

use keyhook_core::Binding;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

/// Service-wide tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Capture-loop wait timeout; bounds how quickly a stop is observed.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Bounded join on stop before the loop thread is abandoned.
    #[serde(default = "default_stop_join_timeout_ms")]
    pub stop_join_timeout_ms: u64,
    /// Timeout applied to every `http_request` action.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Cap on concurrently running detached sound playbacks.
    #[serde(default = "default_max_detached_playbacks")]
    pub max_detached_playbacks: usize,
}

/// A keyboard the user has named or chosen to intercept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    pub hardware_id: String,
    #[serde(default)]
    pub friendly_name: String,
    /// Withhold every key of this device from the OS.
    #[serde(default)]
    pub intercepted: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_wait_timeout_ms() -> u64 {
    100
}
fn default_stop_join_timeout_ms() -> u64 {
    1000
}
fn default_http_timeout_secs() -> u64 {
    10
}
fn default_max_detached_playbacks() -> usize {
    8
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            wait_timeout_ms: default_wait_timeout_ms(),
            stop_join_timeout_ms: default_stop_join_timeout_ms(),
            http_timeout_secs: default_http_timeout_secs(),
            max_detached_playbacks: default_max_detached_playbacks(),
        }
    }
}

impl AppConfig {
    /// Hardware ids of every device configured as intercepted.
    pub fn intercepted_hardware_ids(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter(|d| d.intercepted)
            .map(|d| d.hardware_id.clone())
            .collect()
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from `path`, or from the platform location when `None`.
///
/// A missing file yields [`AppConfig::default()`].
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let config: AppConfig = toml::from_str(&content).map_err(|e| {
                warn!(path = %path.display(), "configuration is not valid TOML: {e}");
                e
            })?;
            info!(path = %path.display(), "configuration loaded");
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no configuration file; using defaults");
            Ok(AppConfig::default())
        }
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to `path`, or to the platform location when `None`.
///
/// Creates the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig, path: Option<&Path>) -> Result<(), ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory including the `Keyhook` part.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Keyhook"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("keyhook"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("Keyhook"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keyhook_core::ActionDescriptor;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("keyhook_test_{}", Uuid::new_v4()))
            .join("config.toml")
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        // Arrange / Act
        let settings = Settings::default();

        // Assert
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.wait_timeout_ms, 100);
        assert_eq!(settings.stop_join_timeout_ms, 1000);
        assert_eq!(settings.http_timeout_secs, 10);
        assert_eq!(settings.max_detached_playbacks, 8);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_settings_override_defaults() {
        let cfg: AppConfig = toml::from_str("[settings]\nwait_timeout_ms = 25\n").expect("deserialize");
        assert_eq!(cfg.settings.wait_timeout_ms, 25);
        assert_eq!(cfg.settings.http_timeout_secs, 10);
    }

    // ── Bindings ──────────────────────────────────────────────────────────────

    #[test]
    fn test_binding_with_inline_parameters_parses() {
        // Arrange
        let toml_str = r#"
[[bindings]]
device_hardware_id = "HID\\VID_1532"
scan_code = 59

[bindings.action]
type_id = "send_keys"
parameters = { key_sequence = "Ctrl+Shift+F1", delay_ms = 50 }
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize");

        // Assert
        let binding = &cfg.bindings[0];
        assert_eq!(binding.device_hardware_id, "HID\\VID_1532");
        assert_eq!(binding.scan_code, 59);
        assert!(binding.trigger_on_key_down);
        assert!(binding.block_key);
        assert_eq!(binding.action.type_id, "send_keys");
        assert_eq!(
            binding.action.parameters.get("delay_ms"),
            Some(&serde_json::Value::from(50))
        );
    }

    #[test]
    fn test_intercepted_hardware_ids_filters_devices() {
        let mut cfg = AppConfig::default();
        cfg.devices.push(DeviceEntry {
            hardware_id: "a".into(),
            friendly_name: String::new(),
            intercepted: true,
        });
        cfg.devices.push(DeviceEntry {
            hardware_id: "b".into(),
            friendly_name: String::new(),
            intercepted: false,
        });

        assert_eq!(cfg.intercepted_hardware_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config(Some(&path));

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    // ── load/save ─────────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");
        let cfg = load_config(Some(&path)).expect("missing file is not an error");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        // Arrange
        let path = temp_path();
        let mut cfg = AppConfig::default();
        cfg.settings.log_level = "debug".to_string();
        cfg.devices.push(DeviceEntry {
            hardware_id: "HID\\VID_046D".into(),
            friendly_name: "Left pad".into(),
            intercepted: true,
        });
        cfg.bindings.push(Binding::new(
            "HID\\VID_046D",
            0x1E,
            ActionDescriptor::new("http_request")
                .with_param("url", "http://localhost:8080/hook")
                .with_param("method", "POST"),
        ));

        // Act
        save_config(&cfg, Some(&path)).expect("save");
        let loaded = load_config(Some(&path)).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
    }
}
