//! Telemetry sample types

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Axis
// ============================================================================

/// One of the six motion channels reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    AccelX,
    AccelY,
    AccelZ,
    GyroX,
    GyroY,
    GyroZ,
}

impl Axis {
    /// All channels in wire order.
    pub const ALL: [Axis; 6] = [
        Axis::AccelX,
        Axis::AccelY,
        Axis::AccelZ,
        Axis::GyroX,
        Axis::GyroY,
        Axis::GyroZ,
    ];

    /// Number of channels in a sample.
    pub const COUNT: usize = Self::ALL.len();

    /// Key used for this channel on the wire (`accelX:0.12`).
    pub const fn wire_key(self) -> &'static str {
        match self {
            Axis::AccelX => "accelX",
            Axis::AccelY => "accelY",
            Axis::AccelZ => "accelZ",
            Axis::GyroX => "gyroX",
            Axis::GyroY => "gyroY",
            Axis::GyroZ => "gyroZ",
        }
    }

    /// Look up a channel by its wire key. Keys are case-sensitive.
    pub fn from_wire_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|axis| axis.wire_key() == key)
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_key())
    }
}

// ============================================================================
// Sample
// ============================================================================

/// A validated, timestamped six-channel reading.
///
/// Samples are immutable once built. The constructor rejects non-finite
/// values, so every `Sample` in the pipeline carries finite channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Seconds since the first sample of the session (or sequence number
    /// in counter mode).
    timestamp: f64,
    values: [f64; Axis::COUNT],
}

/// A channel value (or timestamp) was NaN or infinite.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("non-finite value {value} for {field}")]
pub struct NonFiniteValue {
    pub field: &'static str,
    pub value: f64,
}

impl Sample {
    /// Build a sample, rejecting NaN/Inf in the timestamp or any channel.
    pub fn new(timestamp: f64, values: [f64; Axis::COUNT]) -> Result<Self, NonFiniteValue> {
        if !timestamp.is_finite() {
            return Err(NonFiniteValue {
                field: "timestamp",
                value: timestamp,
            });
        }
        for axis in Axis::ALL {
            let value = values[axis.index()];
            if !value.is_finite() {
                return Err(NonFiniteValue {
                    field: axis.wire_key(),
                    value,
                });
            }
        }
        Ok(Self { timestamp, values })
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn get(&self, axis: Axis) -> f64 {
        self.values[axis.index()]
    }

    /// Channel values in `Axis::ALL` order.
    pub fn values(&self) -> [f64; Axis::COUNT] {
        self.values
    }

    pub fn accel_x(&self) -> f64 {
        self.get(Axis::AccelX)
    }

    pub fn accel_y(&self) -> f64 {
        self.get(Axis::AccelY)
    }

    pub fn accel_z(&self) -> f64 {
        self.get(Axis::AccelZ)
    }

    pub fn gyro_x(&self) -> f64 {
        self.get(Axis::GyroX)
    }

    pub fn gyro_y(&self) -> f64 {
        self.get(Axis::GyroY)
    }

    pub fn gyro_z(&self) -> f64 {
        self.get(Axis::GyroZ)
    }

    /// Same timestamp, new channel values. Used by smoothing stages.
    pub fn with_values(&self, values: [f64; Axis::COUNT]) -> Result<Self, NonFiniteValue> {
        Self::new(self.timestamp, values)
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={:.3}s", self.timestamp)?;
        for axis in Axis::ALL {
            write!(f, " {}={:.3}", axis, self.get(axis))?;
        }
        Ok(())
    }
}

// ============================================================================
// Per-channel scale
// ============================================================================

/// Linear scale factor per channel, applied once at assembly time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelScale([f64; Axis::COUNT]);

impl ChannelScale {
    pub const IDENTITY: ChannelScale = ChannelScale([1.0; Axis::COUNT]);

    /// Set the factor for one channel.
    pub fn with(mut self, axis: Axis, factor: f64) -> Self {
        self.0[axis.index()] = factor;
        self
    }

    pub fn factor(&self, axis: Axis) -> f64 {
        self.0[axis.index()]
    }

    pub fn is_identity(&self) -> bool {
        self.0.iter().all(|&f| f == 1.0)
    }

    pub fn apply(&self, values: [f64; Axis::COUNT]) -> [f64; Axis::COUNT] {
        let mut scaled = values;
        for (value, factor) in scaled.iter_mut().zip(self.0) {
            *value *= factor;
        }
        scaled
    }
}

impl Default for ChannelScale {
    fn default() -> Self {
        Self::IDENTITY
    }
}
