//! Host → device commands

use serde::{Deserialize, Serialize};

/// Byte the host writes to ask a polled device for one frame.
pub const REQUEST_SAMPLE_BYTE: u8 = b'.';

/// Byte the host writes when the user toggles the display mode.
pub const TOGGLE_MODE_BYTE: u8 = b'z';

/// A single-byte intent queued by the consumer and written by the
/// acquisition thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    RequestSample,
    ToggleMode,
}

impl Command {
    pub const fn byte(self) -> u8 {
        match self {
            Command::RequestSample => REQUEST_SAMPLE_BYTE,
            Command::ToggleMode => TOGGLE_MODE_BYTE,
        }
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            REQUEST_SAMPLE_BYTE => Some(Command::RequestSample),
            TOGGLE_MODE_BYTE => Some(Command::ToggleMode),
            _ => None,
        }
    }
}
