//! System-wide default constants.
//!
//! Values the config structs fall back to, plus the thresholds validation
//! uses to flag suspicious settings. Grouped by subsystem.

// ============================================================================
// Config Discovery
// ============================================================================

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "IMU_TELEMETRY_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "telemetry.toml";

// ============================================================================
// Link
// ============================================================================

/// Serial port used when none is configured.
#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM3";
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Read deadline per line (ms).
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1_000;

/// Baud rates UART bridges commonly support; anything else is warned about.
pub const STANDARD_BAUD_RATES: &[u32] = &[
    1_200, 2_400, 4_800, 9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600,
    1_000_000, 2_000_000,
];

/// Read timeouts above this make close requests sluggish (ms).
pub const READ_TIMEOUT_WARN_MS: u64 = 10_000;

// ============================================================================
// Processing
// ============================================================================

/// Smoothing windows above this add seconds of lag at typical IMU rates.
pub const SMOOTHING_WINDOW_WARN: usize = 1_000;

// ============================================================================
// Consumer
// ============================================================================

/// Consumer poll period (ms).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5;

/// How often the headless consumer logs a status line (ms).
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 1_000;

// ============================================================================
// Simulation
// ============================================================================

/// Frame period of the simulated device (ms). 50 Hz.
pub const SIMULATED_FRAME_INTERVAL_MS: u64 = 20;
