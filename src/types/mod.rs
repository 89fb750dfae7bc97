//! Shared data structures for the IMU telemetry pipeline
//!
//! - `RawFrame`: key/value pairs split out of one device line
//! - `Sample`: validated, timestamped six-channel record
//! - `Command`: single-byte host → device requests

mod sample;
mod frame;
mod command;

pub use sample::*;
pub use frame::*;
pub use command::*;
