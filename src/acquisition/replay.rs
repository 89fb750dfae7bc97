//! Replay link: scripted or recorded device output
//!
//! Replays a capture file line by line (with optional pacing), or a script
//! of read events for tests. Running off the end of the script reports
//! `Disconnected`, the same way a pulled cable would.

use super::link::{LineRead, Link, LinkError};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

/// One scripted read outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayEvent {
    Line(Vec<u8>),
    Timeout,
    Disconnect,
}

impl ReplayEvent {
    pub fn line(text: &str) -> Self {
        ReplayEvent::Line(text.trim_end_matches(['\r', '\n']).as_bytes().to_vec())
    }
}

/// Link that plays back a fixed sequence of events and records writes.
#[derive(Debug, Clone)]
pub struct ReplayLink {
    name: String,
    events: VecDeque<ReplayEvent>,
    delay: Duration,
    written: Vec<u8>,
    closed: bool,
}

impl ReplayLink {
    pub fn new(events: impl IntoIterator<Item = ReplayEvent>) -> Self {
        Self {
            name: "replay".to_string(),
            events: events.into_iter().collect(),
            delay: Duration::ZERO,
            written: Vec::new(),
            closed: false,
        }
    }

    /// Replay the lines of `text`, one event per line.
    pub fn from_text(text: &str) -> Self {
        Self::new(text.lines().map(ReplayEvent::line))
    }

    /// Replay a capture file recorded from the device.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let events = bytes
            .split(|&b| b == b'\n')
            .map(|line| ReplayEvent::Line(line.strip_suffix(b"\r").unwrap_or(line).to_vec()))
            .collect::<Vec<_>>();
        let mut link = Self::new(events);
        // A trailing newline yields one empty tail entry
        if bytes.ends_with(b"\n") {
            link.events.pop_back();
        }
        link.name = path.display().to_string();
        Ok(link)
    }

    /// Sleep this long before each line, to mimic the device's rate.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every byte written to the link so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Link for ReplayLink {
    fn read_line(&mut self, timeout: Duration) -> Result<LineRead, LinkError> {
        if self.closed {
            return Err(LinkError::Disconnected("link closed".to_string()));
        }
        match self.events.pop_front() {
            Some(ReplayEvent::Line(line)) => {
                if !self.delay.is_zero() {
                    std::thread::sleep(self.delay);
                }
                Ok(LineRead::Line(line))
            }
            Some(ReplayEvent::Timeout) => {
                std::thread::sleep(timeout.min(self.delay));
                Ok(LineRead::Timeout)
            }
            Some(ReplayEvent::Disconnect) => {
                self.closed = true;
                Err(LinkError::Disconnected("device went away".to_string()))
            }
            None => {
                self.closed = true;
                Err(LinkError::Disconnected("end of replay".to_string()))
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Disconnected("link closed".to_string()));
        }
        self.written.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn name(&self) -> &str {
        &self.name
    }
}
