//! Checks on `telemetry.toml` beyond what serde enforces
//!
//! - Unknown keys: the raw document is walked as a `toml::Value` and every
//!   dotted path not in [`known_config_keys`] is reported, with the nearest
//!   known key by edit distance. A misspelt `[link] prot = ...` would
//!   otherwise silently fall back to the default port.
//! - Ranges: a parsed [`TelemetryConfig`] is checked for values the
//!   acquisition loop cannot run with (zero capacity or read timeout, a
//!   non-finite scale, an empty retention window) and for values that only
//!   look wrong (odd baud rates, long timeouts, very wide smoothing windows).
//!
//! Unknown keys and suspicious values are warnings; only range errors stop
//! startup.

use std::collections::HashSet;

use super::defaults;
use super::TelemetryConfig;
use crate::processing::Retention;

/// Something in the config worth logging that does not stop startup.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// Dotted key path, e.g. `link.baud_rate`.
    pub field: String,
    pub message: String,
    /// Closest known key, for unknown-key warnings.
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.suggestion {
            Some(known) => write!(f, "{} (did you mean '{known}'?)", self.message),
            None => f.write_str(&self.message),
        }
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `TelemetryConfig`.
///
/// Maintained by hand to match the struct hierarchy in telemetry_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [link]
        "link",
        "link.port",
        "link.baud_rate",
        "link.read_timeout_ms",
        "link.mode",
        // [frame]
        "frame",
        "frame.diagnostic_prefix",
        "frame.max_line_bytes",
        // [assembly]
        "assembly",
        "assembly.timestamp",
        "assembly.scale",
        "assembly.scale.accel_x",
        "assembly.scale.accel_y",
        "assembly.scale.accel_z",
        "assembly.scale.gyro_x",
        "assembly.scale.gyro_y",
        "assembly.scale.gyro_z",
        // [smoothing]
        "smoothing",
        "smoothing.window",
        // [retention]
        "retention",
        "retention.by_count",
        "retention.by_time",
        // [channel]
        "channel",
        "channel.capacity",
        "channel.backpressure",
        // [consumer]
        "consumer",
        "consumer.poll_interval_ms",
        "consumer.status_interval_ms",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Dotted paths of every table and key under `value`, parents first.
///
/// `[assembly.scale] gyro_x = 1.0` yields `assembly`, `assembly.scale` and
/// `assembly.scale.gyro_x`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(value, prefix, &mut paths);
    paths
}

fn collect_paths(value: &toml::Value, prefix: &str, out: &mut Vec<String>) {
    let Some(table) = value.as_table() else {
        return;
    };
    for (key, child) in table {
        let path = match prefix {
            "" => key.clone(),
            _ => format!("{prefix}.{key}"),
        };
        out.push(path.clone());
        collect_paths(child, &path, out);
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Edit distance between two strings, counted in chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Only warns; parse errors are reported later by serde.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate value ranges on a parsed `TelemetryConfig`.
///
/// Returns (errors, warnings). Errors are values the pipeline cannot run
/// with and must prevent startup; warnings are suspicious but not fatal.
pub fn validate_physical_ranges(
    config: &TelemetryConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let link = &config.link;
    if link.port.trim().is_empty() {
        errors.push("link.port must not be empty".to_string());
    }
    if link.baud_rate == 0 {
        errors.push("link.baud_rate must be > 0".to_string());
    } else if !defaults::STANDARD_BAUD_RATES.contains(&link.baud_rate) {
        warnings.push(ValidationWarning {
            field: "link.baud_rate".to_string(),
            message: format!("link.baud_rate = {} is not a standard rate", link.baud_rate),
            suggestion: None,
        });
    }

    // The read timeout doubles as the loop's cancellation latency
    if link.read_timeout_ms == 0 {
        errors.push("link.read_timeout_ms must be > 0".to_string());
    } else if link.read_timeout_ms > defaults::READ_TIMEOUT_WARN_MS {
        warnings.push(ValidationWarning {
            field: "link.read_timeout_ms".to_string(),
            message: format!(
                "link.read_timeout_ms = {} delays shutdown by up to that long",
                link.read_timeout_ms
            ),
            suggestion: None,
        });
    }

    if config.frame.max_line_bytes == 0 {
        errors.push("frame.max_line_bytes must be > 0".to_string());
    }

    for (key, _, factor) in config.assembly.scale.entries() {
        if !factor.is_finite() {
            errors.push(format!("assembly.scale.{key} = {factor} must be finite"));
        }
    }

    if config.smoothing.window > defaults::SMOOTHING_WINDOW_WARN {
        warnings.push(ValidationWarning {
            field: "smoothing.window".to_string(),
            message: format!(
                "smoothing.window = {} is unusually large (> {})",
                config.smoothing.window,
                defaults::SMOOTHING_WINDOW_WARN
            ),
            suggestion: None,
        });
    }

    match config.retention {
        Retention::ByCount(0) => errors.push("retention.by_count must be > 0".to_string()),
        Retention::ByTime(w) if !w.is_finite() || w <= 0.0 => {
            errors.push(format!("retention.by_time = {w} must be a positive number of seconds"));
        }
        _ => {}
    }

    if config.channel.capacity == 0 {
        errors.push("channel.capacity must be > 0".to_string());
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
