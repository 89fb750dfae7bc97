//! Sensor data acquisition module
//!
//! Everything owned by the acquisition thread: the link to the device,
//! line → frame parsing, and frame → sample assembly.

pub mod link;
pub mod replay;
pub mod simulated;
pub mod frame_parser;
pub mod assembler;

pub use link::{available_ports, LineBuffer, LineRead, Link, LinkError, SerialLink, TimedPort};
pub use replay::{ReplayEvent, ReplayLink};
pub use simulated::SimulatedLink;
pub use frame_parser::{FrameParser, ParseError};
pub use assembler::{AssembleError, SampleAssembler, TimestampPolicy};

use serde::{Deserialize, Serialize};

/// How frames are requested from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Device streams frames on its own; the host only reads.
    #[default]
    FreeRunning,
    /// Half-duplex: the host writes a request byte before every read and
    /// the device answers with exactly one frame.
    Polling,
}
