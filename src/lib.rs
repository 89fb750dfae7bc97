//! IMU Telemetry: serial acquisition pipeline for six-axis motion sensors
//!
//! Reads `key:value` text frames from a serial IMU, turns them into
//! validated, timestamped, smoothed samples, and hands them to a consumer
//! that keeps a bounded window of recent history.
//!
//! ## Architecture
//!
//! - **Acquisition**: `Link` (serial, replay, simulated), `FrameParser`,
//!   `SampleAssembler`
//! - **Processing**: per-channel `Smoother`, retention `Window`
//! - **Pipeline**: acquisition thread, bounded sample channel, command
//!   back-channel, consumer-side `TelemetryView`
//! - **Config**: TOML session configuration with validation

pub mod acquisition;
pub mod config;
pub mod pipeline;
pub mod processing;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, TelemetryConfig};

// Re-export commonly used types
pub use types::{Axis, ChannelScale, Command, RawFrame, Sample};

// Re-export acquisition components
pub use acquisition::{
    FrameParser, LineRead, Link, LinkError, LinkMode, ParseError, ReplayEvent, ReplayLink,
    SampleAssembler, SerialLink, SimulatedLink, TimestampPolicy,
};

// Re-export processing components
pub use processing::{MovingAverage, Retention, Smoother, Window};

// Re-export pipeline components
pub use pipeline::{
    AcquisitionLoop, Backpressure, CommandSink, PipelineParts, SessionEnd, SessionReport,
    StatsSnapshot, TelemetryView,
};
