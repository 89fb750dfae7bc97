//! Telemetry Configuration Module
//!
//! Session configuration loaded from TOML files.
//!
//! ## Loading Order
//!
//! 1. `IMU_TELEMETRY_CONFIG` environment variable (path to TOML file)
//! 2. `telemetry.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Load once at startup and hand the value to whatever needs it:
//!
//! ```ignore
//! let config = TelemetryConfig::load();
//! let parts = pipeline::build(&config, link, cancel_token);
//! ```

mod telemetry_config;
pub mod defaults;
pub mod validation;

pub use telemetry_config::*;
