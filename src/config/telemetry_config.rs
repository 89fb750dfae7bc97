//! Telemetry Configuration - link, parsing, smoothing and retention settings
//!
//! Every tunable of the acquisition pipeline is a field here. Each section
//! implements `Default` so a missing file, a missing section, or a missing
//! key all fall back to the same values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::acquisition::frame_parser::{DEFAULT_DIAGNOSTIC_PREFIX, DEFAULT_MAX_LINE_BYTES};
use crate::acquisition::link::DEFAULT_BAUD_RATE;
use crate::acquisition::{LinkMode, TimestampPolicy};
use crate::pipeline::channel::{Backpressure, DEFAULT_CHANNEL_CAPACITY};
use crate::processing::smoother::DEFAULT_SMOOTHING_WINDOW;
use crate::processing::Retention;
use crate::types::{Axis, ChannelScale};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one acquisition session.
///
/// Load with `TelemetryConfig::load()` which searches:
/// 1. `$IMU_TELEMETRY_CONFIG` env var
/// 2. `./telemetry.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Serial link settings
    #[serde(default)]
    pub link: LinkConfig,

    /// Line format
    #[serde(default)]
    pub frame: FrameConfig,

    /// Timestamping and calibration
    #[serde(default)]
    pub assembly: AssemblyConfig,

    /// Per-channel moving average
    #[serde(default)]
    pub smoothing: SmoothingConfig,

    /// Consumer-side retention window
    #[serde(default)]
    pub retention: Retention,

    /// Producer/consumer handoff
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Consumer loop pacing
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

impl TelemetryConfig {
    /// Load configuration using the standard search order:
    /// 1. `$IMU_TELEMETRY_CONFIG` environment variable
    /// 2. `./telemetry.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), port = %config.link.port, "Loaded telemetry config from {}", defaults::CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", defaults::CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./telemetry.toml
        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(port = %config.link.port, "Loaded telemetry config from ./{}", defaults::LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", defaults::LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| match e {
                ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
                other => other,
            })?;
        Ok(config)
    }

    /// Parse and validate TOML text. Unknown keys are warned about, never fatal.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the config to a file, e.g. to seed a `telemetry.toml`.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Telemetry config saved");
        Ok(())
    }

    /// Reject impossible values; log suspicious ones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_physical_ranges(self);
        for w in &warnings {
            warn!(field = %w.field, "{}", w);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.link.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.consumer.poll_interval_ms.max(1))
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.consumer.status_interval_ms.max(1))
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Link
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Serial device path (`/dev/ttyUSB0`, `COM3`)
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Per-read deadline; also bounds how long a close request can wait
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// `free_running` (device streams) or `polling` (host sends `.` per frame)
    #[serde(default)]
    pub mode: LinkMode,
}

fn default_port() -> String {
    defaults::DEFAULT_PORT.to_string()
}
fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_read_timeout_ms() -> u64 {
    defaults::DEFAULT_READ_TIMEOUT_MS
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            mode: LinkMode::default(),
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Stripped from the start of a line when present. Empty disables.
    #[serde(default = "default_diagnostic_prefix")]
    pub diagnostic_prefix: String,

    /// Longest accepted line, in bytes
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_diagnostic_prefix() -> String {
    DEFAULT_DIAGNOSTIC_PREFIX.to_string()
}
fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}

impl FrameConfig {
    pub fn prefix(&self) -> Option<String> {
        (!self.diagnostic_prefix.is_empty()).then(|| self.diagnostic_prefix.clone())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            diagnostic_prefix: default_diagnostic_prefix(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

// ============================================================================
// Assembly
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// `wall_clock` (seconds since session start) or `counter` (0, 1, 2, ...)
    #[serde(default)]
    pub timestamp: TimestampPolicy,

    #[serde(default)]
    pub scale: ScaleConfig,
}

/// Linear factor per channel, applied before smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    #[serde(default = "unit_scale")]
    pub accel_x: f64,
    #[serde(default = "unit_scale")]
    pub accel_y: f64,
    #[serde(default = "unit_scale")]
    pub accel_z: f64,
    #[serde(default = "unit_scale")]
    pub gyro_x: f64,
    #[serde(default = "unit_scale")]
    pub gyro_y: f64,
    #[serde(default = "unit_scale")]
    pub gyro_z: f64,
}

fn unit_scale() -> f64 {
    1.0
}

impl ScaleConfig {
    /// Factors with their config key, in axis order.
    pub fn entries(&self) -> [(&'static str, Axis, f64); Axis::COUNT] {
        [
            ("accel_x", Axis::AccelX, self.accel_x),
            ("accel_y", Axis::AccelY, self.accel_y),
            ("accel_z", Axis::AccelZ, self.accel_z),
            ("gyro_x", Axis::GyroX, self.gyro_x),
            ("gyro_y", Axis::GyroY, self.gyro_y),
            ("gyro_z", Axis::GyroZ, self.gyro_z),
        ]
    }

    pub fn to_channel_scale(&self) -> ChannelScale {
        self.entries()
            .into_iter()
            .fold(ChannelScale::IDENTITY, |scale, (_, axis, factor)| {
                scale.with(axis, factor)
            })
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            accel_x: 1.0,
            accel_y: 1.0,
            accel_z: 1.0,
            gyro_x: 1.0,
            gyro_y: 1.0,
            gyro_z: 1.0,
        }
    }
}

// ============================================================================
// Smoothing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Raw values averaged per channel; 0 disables smoothing
    #[serde(default = "default_smoothing_window")]
    pub window: usize,
}

fn default_smoothing_window() -> usize {
    DEFAULT_SMOOTHING_WINDOW
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: default_smoothing_window(),
        }
    }
}

// ============================================================================
// Channel
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_channel_capacity")]
    pub capacity: usize,

    /// `drop_oldest` or `block`
    #[serde(default)]
    pub backpressure: Backpressure,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_channel_capacity(),
            backpressure: Backpressure::default(),
        }
    }
}

// ============================================================================
// Consumer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    defaults::DEFAULT_POLL_INTERVAL_MS
}
fn default_status_interval_ms() -> u64 {
    defaults::DEFAULT_STATUS_INTERVAL_MS
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
