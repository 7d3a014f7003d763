//! Lamp Configuration - capture, serial, queue and pacing settings as TOML
//!
//! Every section implements `Default` with the values the indicator firmware
//! was built against, so running without a config file needs only an interface
//! and a serial device.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use super::validation::{self, ValidationWarning};
use crate::pipeline::OverflowPolicy;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one capture interface driving one lamp.
///
/// Load with `LampConfig::load()` which searches:
/// 1. An explicit path (`--config`)
/// 2. `$NETLAMP_CONFIG` env var
/// 3. `./netlamp.toml`
/// 4. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LampConfig {
    /// Network interface to observe
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Serial link to the indicator device
    #[serde(default)]
    pub serial: SerialConfig,

    /// Ingestion queue between capture and processing
    #[serde(default)]
    pub queue: QueueConfig,

    /// Output pacing
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CliPath(PathBuf),
    EnvVar(PathBuf),
    WorkingDir(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliPath(p) => write!(f, "{} (--config)", p.display()),
            Self::EnvVar(p) => write!(f, "{} (${})", p.display(), defaults::CONFIG_ENV_VAR),
            Self::WorkingDir(p) => write!(f, "{}", p.display()),
            Self::Defaults => write!(f, "built-in defaults"),
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub interface: Option<String>,
    pub serial_device: Option<String>,
    pub baud_rate: Option<u32>,
    pub pacing_ms: Option<u64>,
    pub overflow_policy: Option<OverflowPolicy>,
}

impl LampConfig {
    /// Load configuration using the standard search order.
    ///
    /// An explicit path must load cleanly. The env var and working-directory
    /// candidates fall back to the next step with a warning when they fail.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        // 1. Explicit path
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded config from --config");
            return Ok((config, ConfigSource::CliPath(path.to_path_buf())));
        }

        // 2. Check env var
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", defaults::CONFIG_ENV_VAR);
                        return Ok((config, ConfigSource::EnvVar(p)));
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", defaults::CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        // 3. Check ./netlamp.toml
        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", defaults::CONFIG_FILE_NAME);
                    return Ok((config, ConfigSource::WorkingDir(local)));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::CONFIG_FILE_NAME);
                }
            }
        }

        // 4. Defaults
        info!("No {} found, using built-in defaults", defaults::CONFIG_FILE_NAME);
        Ok((Self::default(), ConfigSource::Defaults))
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are logged as warnings; range errors are fatal.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        for w in config.validate()? {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Check value ranges.
    ///
    /// Returns the non-fatal warnings on success.
    pub fn validate(&self) -> Result<Vec<ValidationWarning>, ConfigError> {
        let (errors, warnings) = validation::validate_ranges(self);
        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Apply command-line overrides on top of file values.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(interface) = overrides.interface {
            self.capture.interface = Some(interface);
        }
        if let Some(device) = overrides.serial_device {
            self.serial.device = Some(device);
        }
        if let Some(baud) = overrides.baud_rate {
            self.serial.baud_rate = baud;
        }
        if let Some(ms) = overrides.pacing_ms {
            self.pacing.interval_ms = ms;
        }
        if let Some(policy) = overrides.overflow_policy {
            self.queue.overflow_policy = policy;
        }
    }

    /// The capture interface, which has no usable default.
    pub fn require_interface(&self) -> Result<&str, ConfigError> {
        self.capture
            .interface
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("capture.interface", "--interface"))
    }

    /// The serial device path, which has no usable default.
    pub fn require_serial_device(&self) -> Result<&str, ConfigError> {
        self.serial
            .device
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("serial.device", "--serial"))
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),

    #[error("`{0}` is not set (use {1} or the config file)")]
    Missing(&'static str, &'static str),
}

// ============================================================================
// Capture
// ============================================================================

/// libpcap capture settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Interface name as reported by `netlamp devices`
    #[serde(default)]
    pub interface: Option<String>,

    /// Snapshot length in bytes
    #[serde(default = "default_snaplen")]
    pub snaplen: i32,

    /// Capture traffic not addressed to this host
    #[serde(default = "default_promiscuous")]
    pub promiscuous: bool,

    /// libpcap read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: i32,
}

fn default_snaplen() -> i32 { defaults::CAPTURE_SNAPLEN }
fn default_promiscuous() -> bool { true }
fn default_read_timeout_ms() -> i32 { defaults::CAPTURE_READ_TIMEOUT_MS }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            snaplen: default_snaplen(),
            promiscuous: default_promiscuous(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

// ============================================================================
// Serial
// ============================================================================

/// Serial port settings for the indicator device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyACM0` or `COM3`
    #[serde(default)]
    pub device: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_baud_rate() -> u32 { defaults::SERIAL_BAUD_RATE }
fn default_write_timeout_ms() -> u64 { defaults::SERIAL_WRITE_TIMEOUT_MS }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: None,
            baud_rate: default_baud_rate(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl SerialConfig {
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Ingestion queue sizing and overflow behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Resident length at which `drop_newest` discards arrivals
    #[serde(default = "default_overflow_threshold")]
    pub overflow_threshold: usize,

    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

fn default_capacity() -> usize { defaults::QUEUE_CAPACITY }
fn default_overflow_threshold() -> usize { defaults::QUEUE_OVERFLOW_THRESHOLD }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            overflow_threshold: default_overflow_threshold(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

// ============================================================================
// Pacing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Minimum spacing between frames written to the device
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Time allowed on shutdown to flush queued frames (0 abandons them)
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_interval_ms() -> u64 { defaults::PACING_INTERVAL_MS }
fn default_drain_timeout_ms() -> u64 { defaults::DRAIN_TIMEOUT_MS }

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl PacingConfig {
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
