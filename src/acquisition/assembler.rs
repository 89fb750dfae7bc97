//! Sample assembly: timestamping and per-channel scaling of parsed frames

use crate::types::{ChannelScale, NonFiniteValue, RawFrame, Sample};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

/// How samples are timestamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Seconds since the first assembled sample, from the monotonic clock.
    #[default]
    WallClock,
    /// Sequence number of the accepted frame, starting at 0.
    Counter,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssembleError {
    #[error("scaled sample rejected: {0}")]
    NonFinite(#[from] NonFiniteValue),
}

/// Turns frames into samples for one link session.
#[derive(Debug, Clone)]
pub struct SampleAssembler {
    policy: TimestampPolicy,
    scale: ChannelScale,
    session_start: Option<Instant>,
    last_timestamp: f64,
    next_sequence: u64,
}

impl SampleAssembler {
    pub fn new(policy: TimestampPolicy) -> Self {
        Self {
            policy,
            scale: ChannelScale::IDENTITY,
            session_start: None,
            last_timestamp: 0.0,
            next_sequence: 0,
        }
    }

    pub fn with_scale(mut self, scale: ChannelScale) -> Self {
        self.scale = scale;
        self
    }

    pub fn policy(&self) -> TimestampPolicy {
        self.policy
    }

    /// Assemble a sample captured at `now`.
    ///
    /// The first sample of the session is stamped 0.0. Rejected frames do
    /// not advance the sequence counter or start the session clock.
    pub fn assemble(&mut self, frame: &RawFrame, now: Instant) -> Result<Sample, AssembleError> {
        let values = self.scale.apply(frame.channels());

        let timestamp = match self.policy {
            TimestampPolicy::WallClock => {
                let start = self.session_start.unwrap_or(now);
                // Never step back, even if a caller passes an older `now`
                now.saturating_duration_since(start)
                    .as_secs_f64()
                    .max(self.last_timestamp)
            }
            TimestampPolicy::Counter => self.next_sequence as f64,
        };

        let sample = Sample::new(timestamp, values)?;

        if self.session_start.is_none() {
            self.session_start = Some(now);
        }
        self.last_timestamp = timestamp;
        self.next_sequence += 1;
        Ok(sample)
    }

    /// Forget the session clock and counter (new link session).
    pub fn reset(&mut self) {
        self.session_start = None;
        self.last_timestamp = 0.0;
        self.next_sequence = 0;
    }

    /// Frames accepted so far this session.
    pub fn assembled(&self) -> u64 {
        self.next_sequence
    }
}
